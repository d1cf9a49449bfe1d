use std::{
    fs,
    path::PathBuf,
    process::{Child, Command, Stdio},
};

use anyhow::{Context, Result, anyhow};

use crate::config::Config;

#[cfg(feature = "audio-rodio")]
pub use self::device::RodioAudioSink;

/// Plays one decoded feedback clip.
pub trait AudioSink: Send {
    fn play(&mut self, audio: &[u8]) -> Result<()>;
}

/// Where feedback clips end up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AudioOutput {
    /// The default output device.
    Device,
    /// An external program given the spooled clip path.
    Player(Vec<String>),
}

impl AudioOutput {
    pub fn from_config(config: &Config) -> Self {
        match config.audio_player.clone().filter(|cmd| !cmd.is_empty()) {
            Some(cmd) => AudioOutput::Player(cmd),
            None => AudioOutput::Device,
        }
    }

    pub fn into_sink(self, spool_dir: PathBuf) -> Box<dyn AudioSink> {
        match self {
            AudioOutput::Device => device_sink(spool_dir),
            AudioOutput::Player(cmd) => Box::new(PlayerAudioSink::new(Some(cmd), spool_dir)),
        }
    }
}

#[cfg(feature = "audio-rodio")]
fn device_sink(_spool_dir: PathBuf) -> Box<dyn AudioSink> {
    Box::new(RodioAudioSink::new())
}

#[cfg(not(feature = "audio-rodio"))]
fn device_sink(spool_dir: PathBuf) -> Box<dyn AudioSink> {
    log::warn!("built without audio output, feedback clips are only spooled");
    Box::new(PlayerAudioSink::new(None, spool_dir))
}

#[cfg(feature = "audio-rodio")]
mod device {
    use std::{io::Cursor, thread};

    use anyhow::{Context, Result, anyhow};
    use crossbeam_channel::{Sender, unbounded};
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};

    use super::AudioSink;

    /// Plays clips on the default output device. The output stream is not
    /// `Send`, so it lives on a dedicated thread fed over a channel; each new
    /// clip stops the one before it.
    pub struct RodioAudioSink {
        clips: Option<Sender<Vec<u8>>>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl RodioAudioSink {
        pub fn new() -> Self {
            let (clips_tx, clips_rx) = unbounded::<Vec<u8>>();
            let handle = thread::spawn(move || {
                let (_stream, output) = match OutputStream::try_default() {
                    Ok(pair) => pair,
                    Err(err) => {
                        log::warn!("no audio output device, feedback clips are muted: {err}");
                        while clips_rx.recv().is_ok() {}
                        return;
                    }
                };

                let mut current: Option<Sink> = None;
                while let Ok(clip) = clips_rx.recv() {
                    if let Some(previous) = current.take() {
                        previous.stop();
                    }
                    match start_clip(&output, clip) {
                        Ok(sink) => current = Some(sink),
                        Err(err) => log::warn!("failed to play feedback clip: {err:#}"),
                    }
                }
                if let Some(sink) = current {
                    sink.stop();
                }
            });

            Self {
                clips: Some(clips_tx),
                handle: Some(handle),
            }
        }
    }

    impl Default for RodioAudioSink {
        fn default() -> Self {
            Self::new()
        }
    }

    fn start_clip(output: &OutputStreamHandle, clip: Vec<u8>) -> Result<Sink> {
        let source = Decoder::new(Cursor::new(clip)).context("unsupported audio clip")?;
        let sink = Sink::try_new(output).context("failed to open audio sink")?;
        sink.append(source);
        Ok(sink)
    }

    impl AudioSink for RodioAudioSink {
        fn play(&mut self, audio: &[u8]) -> Result<()> {
            // Undecodable clips are reported to the caller, not just logged.
            Decoder::new(Cursor::new(audio.to_vec())).context("unsupported audio clip")?;
            let clips = self
                .clips
                .as_ref()
                .ok_or_else(|| anyhow!("audio thread stopped"))?;
            clips
                .send(audio.to_vec())
                .map_err(|_| anyhow!("audio thread stopped"))
        }
    }

    impl Drop for RodioAudioSink {
        fn drop(&mut self) {
            self.clips.take();
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

/// Spools each clip to disk and hands it to an external player. Starting a
/// clip stops the previous one.
pub struct PlayerAudioSink {
    player: Option<Vec<String>>,
    spool_dir: PathBuf,
    clip_counter: u64,
    playing: Option<Child>,
}

impl PlayerAudioSink {
    pub fn new(player: Option<Vec<String>>, spool_dir: PathBuf) -> Self {
        Self {
            player: player.filter(|cmd| !cmd.is_empty()),
            spool_dir,
            clip_counter: 0,
            playing: None,
        }
    }

    fn stop_current(&mut self) {
        if let Some(mut child) = self.playing.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn spool(&mut self, audio: &[u8]) -> Result<PathBuf> {
        fs::create_dir_all(&self.spool_dir).with_context(|| {
            format!("failed to create audio spool {}", self.spool_dir.display())
        })?;
        // Alternate between two files so the clip being stopped is never overwritten mid-read.
        self.clip_counter += 1;
        let path = self
            .spool_dir
            .join(format!("feedback-{}.mp3", self.clip_counter % 2));
        fs::write(&path, audio)
            .with_context(|| format!("failed to write audio clip {}", path.display()))?;
        Ok(path)
    }
}

impl AudioSink for PlayerAudioSink {
    fn play(&mut self, audio: &[u8]) -> Result<()> {
        self.stop_current();
        let path = self.spool(audio)?;

        let Some((program, args)) = self.player.as_ref().and_then(|cmd| cmd.split_first()) else {
            log::debug!("no audio player configured, clip kept at {}", path.display());
            return Ok(());
        };

        let child = Command::new(program)
            .args(args)
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| anyhow!("failed to start audio player `{program}`: {err}"))?;
        self.playing = Some(child);
        Ok(())
    }
}

impl Drop for PlayerAudioSink {
    fn drop(&mut self) {
        self.stop_current();
    }
}

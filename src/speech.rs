use std::process::{Child, Command, Stdio};

/// Text-to-speech output. At most one utterance is audible at a time.
pub trait Speaker: Send {
    fn cancel(&mut self);
    fn speak(&mut self, text: &str);
}

/// Speaks through an external TTS program (`say`, `espeak`, ...), one child
/// process per utterance.
pub struct CommandSpeaker {
    command: Option<Vec<String>>,
    current: Option<Child>,
    warned: bool,
}

impl CommandSpeaker {
    pub fn new(command: Option<Vec<String>>) -> Self {
        Self {
            command: command.filter(|cmd| !cmd.is_empty()),
            current: None,
            warned: false,
        }
    }
}

impl Speaker for CommandSpeaker {
    fn cancel(&mut self) {
        if let Some(mut child) = self.current.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }

    fn speak(&mut self, text: &str) {
        self.cancel();
        let Some((program, args)) = self.command.as_ref().and_then(|cmd| cmd.split_first()) else {
            log::debug!("speech disabled, not speaking: {text}");
            return;
        };

        match Command::new(program)
            .args(args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => self.current = Some(child),
            Err(err) => {
                if !self.warned {
                    log::warn!("speech command `{program}` unavailable: {err}");
                    self.warned = true;
                }
            }
        }
    }
}

impl Drop for CommandSpeaker {
    fn drop(&mut self) {
        self.cancel();
    }
}

//! Client side of the coaching service connection: snapshots go out as
//! JPEG data URLs, coaching tips come back as tagged JSON events.

pub mod audio;
pub mod transport;

use anyhow::{Result, anyhow};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::Deserialize;

pub use self::audio::{AudioOutput, AudioSink, PlayerAudioSink};
pub use self::transport::{SendOutcome, Transport, TransportEvent, WsTransport};

use crate::error::SessionError;

pub const AUDIO_FEEDBACK_KIND: &str = "audio_feedback";

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    message: Option<String>,
    audio: Option<String>,
}

/// A recognized coaching event; `audio` is still base64 encoded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedbackEvent {
    pub message: String,
    pub audio: String,
}

/// Parses one inbound text message. `Ok(None)` is a well-formed event of a kind
/// this client does not handle.
pub fn decode_event(text: &str) -> Result<Option<FeedbackEvent>> {
    let raw: RawEvent = serde_json::from_str(text)?;
    if raw.kind != AUDIO_FEEDBACK_KIND {
        return Ok(None);
    }
    let message = raw
        .message
        .ok_or_else(|| anyhow!("audio_feedback event without message"))?;
    Ok(Some(FeedbackEvent {
        message,
        audio: raw.audio.unwrap_or_default(),
    }))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Opening,
    Open,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelNotice {
    Opened,
    Feedback(String),
    Closed(Option<String>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub sent: u64,
    pub dropped: u64,
    pub ignored: u64,
}

pub struct FeedbackChannel {
    transport: Box<dyn Transport>,
    audio: Box<dyn AudioSink>,
    state: ChannelState,
    stats: ChannelStats,
}

impl FeedbackChannel {
    pub fn new(transport: Box<dyn Transport>, audio: Box<dyn AudioSink>) -> Self {
        Self {
            transport,
            audio,
            state: ChannelState::Closed,
            stats: ChannelStats::default(),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats
    }

    /// Starts connecting unless a connection is already open or opening.
    pub fn open(&mut self, url: &str) -> Result<(), SessionError> {
        if self.state != ChannelState::Closed {
            return Ok(());
        }
        self.transport.connect(url)?;
        self.state = ChannelState::Opening;
        Ok(())
    }

    /// Queues a payload. Returns `false` when the channel is not open or the
    /// outbound queue is full; the payload is then dropped.
    pub fn send(&mut self, payload: String) -> bool {
        if self.state != ChannelState::Open {
            log::debug!("feedback channel not open, dropping payload");
            self.stats.dropped += 1;
            return false;
        }
        match self.transport.send_text(payload) {
            SendOutcome::Queued => {
                self.stats.sent += 1;
                true
            }
            SendOutcome::Dropped => {
                log::debug!("feedback channel busy, dropping payload");
                self.stats.dropped += 1;
                false
            }
        }
    }

    /// Closes the connection whatever state it is in.
    pub fn close(&mut self) {
        self.transport.disconnect();
        self.state = ChannelState::Closed;
    }

    /// Drains transport events in receipt order. Recognized feedback is played
    /// through the audio sink before its message is returned.
    pub fn poll(&mut self) -> Vec<ChannelNotice> {
        let mut notices = Vec::new();
        while let Some(event) = self.transport.try_next() {
            match event {
                TransportEvent::Connected => {
                    if self.state == ChannelState::Opening {
                        self.state = ChannelState::Open;
                        notices.push(ChannelNotice::Opened);
                    }
                }
                TransportEvent::Disconnected(reason) => {
                    if self.state != ChannelState::Closed {
                        self.state = ChannelState::Closed;
                        notices.push(ChannelNotice::Closed(reason));
                    }
                }
                TransportEvent::Text(text) => {
                    if let Some(message) = self.handle_text(&text) {
                        notices.push(ChannelNotice::Feedback(message));
                    }
                }
            }
        }
        notices
    }

    fn handle_text(&mut self, text: &str) -> Option<String> {
        let event = match decode_event(text) {
            Ok(Some(event)) => event,
            Ok(None) => {
                log::trace!("ignoring feedback event of unhandled kind");
                self.stats.ignored += 1;
                return None;
            }
            Err(err) => {
                log::debug!("dropping malformed feedback event: {err}");
                self.stats.ignored += 1;
                return None;
            }
        };

        match BASE64.decode(event.audio.as_bytes()) {
            Ok(clip) if !clip.is_empty() => {
                if let Err(err) = self.audio.play(&clip) {
                    log::warn!("failed to play feedback audio: {err:#}");
                }
            }
            Ok(_) => log::warn!("feedback event carried no audio"),
            Err(err) => log::warn!("feedback audio is not valid base64: {err}"),
        }
        Some(event.message)
    }
}

impl Drop for FeedbackChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{
        collections::VecDeque,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[derive(Debug, Default)]
    pub struct TransportLog {
        pub connects: Vec<String>,
        pub disconnects: usize,
        pub sent: Vec<String>,
        pub pending: VecDeque<TransportEvent>,
        pub reject_sends: bool,
        pub fail_connect: bool,
    }

    /// In-memory transport; tests push inbound events through the shared log.
    #[derive(Clone, Default)]
    pub struct FakeTransport(pub Arc<Mutex<TransportLog>>);

    impl FakeTransport {
        pub fn push(&self, event: TransportEvent) {
            self.0.lock().unwrap().pending.push_back(event);
        }

        pub fn log(&self) -> std::sync::MutexGuard<'_, TransportLog> {
            self.0.lock().unwrap()
        }
    }

    impl Transport for FakeTransport {
        fn connect(&mut self, url: &str) -> Result<(), SessionError> {
            let mut log = self.log();
            if log.fail_connect {
                return Err(SessionError::InvalidEndpoint(url.to_string()));
            }
            log.connects.push(url.to_string());
            Ok(())
        }

        fn send_text(&mut self, payload: String) -> SendOutcome {
            let mut log = self.log();
            if log.reject_sends {
                return SendOutcome::Dropped;
            }
            log.sent.push(payload);
            SendOutcome::Queued
        }

        fn disconnect(&mut self) {
            let mut log = self.log();
            log.disconnects += 1;
            log.pending.clear();
        }

        fn try_next(&mut self) -> Option<TransportEvent> {
            self.log().pending.pop_front()
        }
    }

    #[derive(Clone, Default)]
    pub struct FakeAudio(pub Arc<Mutex<Vec<Vec<u8>>>>);

    impl FakeAudio {
        pub fn played(&self) -> Vec<Vec<u8>> {
            self.0.lock().unwrap().clone()
        }
    }

    impl AudioSink for FakeAudio {
        fn play(&mut self, audio: &[u8]) -> Result<()> {
            self.0.lock().unwrap().push(audio.to_vec());
            Ok(())
        }
    }

    pub fn audio_feedback(message: &str, audio: &[u8]) -> TransportEvent {
        TransportEvent::Text(
            serde_json::json!({
                "type": AUDIO_FEEDBACK_KIND,
                "message": message,
                "audio": BASE64.encode(audio),
            })
            .to_string(),
        )
    }
}

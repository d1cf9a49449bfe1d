//! The live session: one camera capture loop, one frame analysis worker and
//! one feedback channel, started and stopped together from two pieces of user
//! intent (activity and camera on/off). Lifecycle and sending stay on the
//! caller's thread; inference and encoding happen on the analysis worker, and
//! [`SessionController::pump`] drains its results alongside channel events.

use crossbeam_channel::{TryRecvError, bounded};

use crate::{
    config::Config,
    error::{ActivityParseError, SessionError},
    feedback::{ChannelNotice, ChannelState, FeedbackChannel},
    pipeline::{
        AnalysisSettings, AnalysisStages, AnalysisWorker, Canvas, CaptureSource, FrameAnalysis,
        LandmarkSource, OverlayRenderer,
    },
    rules,
    speech::Speaker,
    types::{Activity, PoseLandmarks},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    /// Camera disabled, channel closed.
    Idle,
    /// Camera enabled, channel still connecting.
    Starting,
    /// Channel open; frames go to the overlay and to the channel.
    Live,
    /// Camera enabled but the channel closed or failed; only local overlay.
    Offline,
}

impl SessionPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "Camera off",
            SessionPhase::Starting => "Connecting",
            SessionPhase::Live => "Live",
            SessionPhase::Offline => "Offline",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionSettings {
    pub server_url: String,
    pub jpeg_quality: f32,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub rules_enabled: bool,
    pub activity: Activity,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            server_url: config.server_url.clone(),
            jpeg_quality: config.jpeg_quality,
            canvas_width: config.camera.width,
            canvas_height: config.camera.height,
            rules_enabled: config.rules_enabled,
            activity: config.default_activity,
        }
    }
}

/// The collaborators a session drives.
pub struct SessionParts {
    pub capture: Box<dyn CaptureSource>,
    pub landmarks: Box<dyn LandmarkSource>,
    pub renderer: Box<dyn OverlayRenderer>,
    pub channel: FeedbackChannel,
    pub speaker: Box<dyn Speaker>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_drawn: u64,
    pub frames_skipped: u64,
    pub frames_sent: u64,
    /// Snapshots the feedback channel refused (not open, or queue full).
    pub sends_dropped: u64,
    /// Inbound events that were malformed or of an unhandled kind.
    pub events_ignored: u64,
}

enum AnalysisPoll {
    Ready(FrameAnalysis),
    Empty,
    Ended,
}

pub struct SessionController {
    capture: Box<dyn CaptureSource>,
    channel: FeedbackChannel,
    speaker: Box<dyn Speaker>,
    // Parked here while no worker is running.
    stages: Option<AnalysisStages>,
    worker: Option<AnalysisWorker>,
    settings: SessionSettings,
    activity: Activity,
    camera_enabled: bool,
    phase: SessionPhase,
    feedback: Option<String>,
    last_error: Option<String>,
    canvas: Canvas,
    stats: SessionStats,
}

impl SessionController {
    pub fn new(parts: SessionParts, settings: SessionSettings) -> Self {
        let SessionParts {
            capture,
            landmarks,
            renderer,
            channel,
            speaker,
        } = parts;

        Self {
            capture,
            channel,
            speaker,
            stages: Some(AnalysisStages {
                landmarks,
                renderer,
            }),
            worker: None,
            canvas: Canvas::new(settings.canvas_width, settings.canvas_height),
            activity: settings.activity,
            settings,
            camera_enabled: false,
            phase: SessionPhase::Idle,
            feedback: None,
            last_error: None,
            stats: SessionStats::default(),
        }
    }

    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn camera_enabled(&self) -> bool {
        self.camera_enabled
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel.state()
    }

    pub fn feedback(&self) -> Option<&str> {
        self.feedback.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Frame counters plus the feedback channel's drop and ignore counts.
    pub fn stats(&self) -> SessionStats {
        let channel = self.channel.stats();
        SessionStats {
            sends_dropped: channel.dropped,
            events_ignored: channel.ignored,
            ..self.stats
        }
    }

    /// Switches activity. A running pipeline is torn down and restarted so
    /// nothing from the previous activity keeps running.
    pub fn set_activity(&mut self, activity: Activity) {
        if activity == self.activity {
            return;
        }
        log::info!("activity changed: {} -> {}", self.activity, activity);
        self.activity = activity;

        if self.camera_enabled {
            self.teardown();
            self.start();
        }
    }

    pub fn set_activity_name(&mut self, name: &str) -> Result<(), ActivityParseError> {
        let activity = name.parse::<Activity>().inspect_err(|err| {
            log::warn!("rejecting activity selection: {err}");
        })?;
        self.set_activity(activity);
        Ok(())
    }

    pub fn set_camera_enabled(&mut self, enabled: bool) {
        if enabled == self.camera_enabled {
            return;
        }
        if enabled {
            self.start();
        } else {
            log::info!("camera disabled");
            self.teardown();
        }
    }

    /// Stops capture (releasing the device), stops analysis, closes the
    /// channel, silences speech and clears the surface. Safe to call in any
    /// state.
    pub fn teardown(&mut self) {
        self.capture.stop();
        if let Some(worker) = self.worker.take() {
            if let Some(stages) = worker.stop() {
                self.stages = Some(stages);
            }
        }
        self.channel.close();
        self.speaker.cancel();
        self.canvas.clear();
        self.camera_enabled = false;
        self.phase = SessionPhase::Idle;
    }

    fn start(&mut self) {
        log::info!("starting {} session", self.activity);
        self.last_error = None;
        self.camera_enabled = true;
        self.phase = SessionPhase::Starting;

        if let Err(err) = self.channel.open(&self.settings.server_url) {
            log::warn!("feedback channel unavailable: {err}");
            self.last_error = Some(err.to_string());
            self.phase = SessionPhase::Offline;
        }

        let (frame_tx, frame_rx) = bounded(1);
        if let Err(err) = self.capture.start(frame_tx) {
            self.fail(err);
            return;
        }
        let Some(stages) = self.stages.take() else {
            self.fail(SessionError::AnalysisUnavailable);
            return;
        };
        self.worker = Some(AnalysisWorker::spawn(
            stages,
            frame_rx,
            AnalysisSettings {
                width: self.settings.canvas_width,
                height: self.settings.canvas_height,
                jpeg_quality: self.settings.jpeg_quality,
            },
        ));
    }

    fn fail(&mut self, err: SessionError) {
        log::error!("session stopped: {err}");
        self.teardown();
        self.last_error = Some(err.to_string());
    }

    /// Applies pending channel events, then takes the newest analysed frame:
    /// swaps in its surface, runs the rules and uploads its snapshot. Returns
    /// whether anything visible changed.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        for notice in self.channel.poll() {
            changed = true;
            self.apply_notice(notice);
        }

        if !self.camera_enabled {
            return changed;
        }

        match self.next_analysis() {
            AnalysisPoll::Ready(analysis) => {
                self.apply_analysis(analysis);
                true
            }
            AnalysisPoll::Empty => changed,
            AnalysisPoll::Ended => {
                self.fail(SessionError::CaptureEnded);
                true
            }
        }
    }

    fn apply_notice(&mut self, notice: ChannelNotice) {
        match notice {
            ChannelNotice::Opened => {
                if self.phase == SessionPhase::Starting {
                    log::info!("session live");
                    self.phase = SessionPhase::Live;
                }
                self.set_upload(true);
            }
            ChannelNotice::Feedback(message) => {
                log::debug!("coaching feedback: {message}");
                self.feedback = Some(message);
            }
            ChannelNotice::Closed(reason) => {
                self.set_upload(false);
                if self.camera_enabled {
                    self.phase = SessionPhase::Offline;
                    if let Some(reason) = reason {
                        self.last_error = Some(SessionError::Channel(reason).to_string());
                    }
                }
            }
        }
    }

    fn set_upload(&self, enabled: bool) {
        if let Some(worker) = &self.worker {
            worker.set_upload(enabled);
        }
    }

    fn next_analysis(&mut self) -> AnalysisPoll {
        let Some(worker) = &self.worker else {
            return AnalysisPoll::Empty;
        };

        let mut latest = None;
        loop {
            match worker.results().try_recv() {
                Ok(analysis) => {
                    if latest.replace(analysis).is_some() {
                        self.stats.frames_skipped += 1;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if latest.is_none() {
                        return AnalysisPoll::Ended;
                    }
                    break;
                }
            }
        }
        latest.map_or(AnalysisPoll::Empty, AnalysisPoll::Ready)
    }

    fn apply_analysis(&mut self, analysis: FrameAnalysis) {
        let FrameAnalysis {
            canvas,
            landmarks,
            snapshot,
            frames_skipped,
        } = analysis;

        self.canvas = canvas;
        self.stats.frames_skipped += frames_skipped;
        self.stats.frames_drawn += 1;
        if self.settings.rules_enabled {
            if let Some(landmarks) = &landmarks {
                self.apply_rules(landmarks);
            }
        }

        // Snapshots encoded while the channel was open may arrive after it closed.
        if let Some(payload) = snapshot {
            if self.channel.is_open() && self.channel.send(payload) {
                self.stats.frames_sent += 1;
            }
        }
    }

    fn apply_rules(&mut self, landmarks: &PoseLandmarks) {
        let Some(message) = rules::evaluate(self.activity, landmarks) else {
            return;
        };
        if self.feedback.as_deref() == Some(message) {
            return;
        }
        self.feedback = Some(message.to_string());
        self.speaker.cancel();
        self.speaker.speak(message);
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}


#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        thread,
        time::{Duration, Instant},
    };

    use crossbeam_channel::Sender;

    use super::*;
    use crate::{
        feedback::{
            TransportEvent,
            testing::{FakeAudio, FakeTransport, audio_feedback},
        },
        speech::testing::{FakeSpeaker, SpeechCall},
        types::{Frame, Landmark, NUM_POSE_LANDMARKS, landmark_index as idx},
    };

    #[derive(Clone, Debug, PartialEq, Eq)]
    enum CaptureCall {
        Start,
        Stop,
    }

    #[derive(Default)]
    struct CaptureLog {
        acquires: usize,
        releases: usize,
        running: bool,
        overlapped: bool,
        fail_next: bool,
        frame_tx: Option<Sender<Frame>>,
        calls: Vec<CaptureCall>,
    }

    #[derive(Clone, Default)]
    struct FakeCapture(Arc<Mutex<CaptureLog>>);

    impl FakeCapture {
        fn log(&self) -> std::sync::MutexGuard<'_, CaptureLog> {
            self.0.lock().unwrap()
        }

        fn deliver(&self, frame: Frame) {
            let tx = self.log().frame_tx.clone().expect("capture not running");
            tx.try_send(frame).unwrap();
        }
    }

    impl CaptureSource for FakeCapture {
        fn start(&mut self, frame_tx: Sender<Frame>) -> Result<(), SessionError> {
            let mut log = self.log();
            if log.fail_next {
                log.fail_next = false;
                return Err(SessionError::CameraUnavailable("permission denied".to_string()));
            }
            if log.running {
                log.overlapped = true;
            }
            log.acquires += 1;
            log.running = true;
            log.frame_tx = Some(frame_tx);
            log.calls.push(CaptureCall::Start);
            Ok(())
        }

        fn stop(&mut self) {
            let mut log = self.log();
            if log.running {
                log.releases += 1;
                log.running = false;
                log.frame_tx = None;
                log.calls.push(CaptureCall::Stop);
            }
        }
    }

    #[derive(Clone, Default)]
    struct FakeLandmarks {
        result: Arc<Mutex<Option<PoseLandmarks>>>,
        calls: Arc<Mutex<usize>>,
        delay: Arc<Mutex<Duration>>,
    }

    impl LandmarkSource for FakeLandmarks {
        fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Option<PoseLandmarks>> {
            let delay = *self.delay.lock().unwrap();
            thread::sleep(delay);
            *self.calls.lock().unwrap() += 1;
            Ok(self.result.lock().unwrap().clone())
        }
    }

    #[derive(Clone, Default)]
    struct FakeRenderer(Arc<Mutex<usize>>);

    impl OverlayRenderer for FakeRenderer {
        fn draw(&mut self, canvas: &mut Canvas, _landmarks: &PoseLandmarks) {
            *self.0.lock().unwrap() += 1;
            canvas.put_pixel(0, 0, [0, 255, 0, 255]);
        }
    }

    struct Harness {
        session: SessionController,
        capture: FakeCapture,
        landmarks: FakeLandmarks,
        renderer: FakeRenderer,
        transport: FakeTransport,
        audio: FakeAudio,
        speaker: FakeSpeaker,
    }

    impl Harness {
        fn new(rules_enabled: bool) -> Self {
            let capture = FakeCapture::default();
            let landmarks = FakeLandmarks::default();
            let renderer = FakeRenderer::default();
            let transport = FakeTransport::default();
            let audio = FakeAudio::default();
            let speaker = FakeSpeaker::default();

            let parts = SessionParts {
                capture: Box::new(capture.clone()),
                landmarks: Box::new(landmarks.clone()),
                renderer: Box::new(renderer.clone()),
                channel: FeedbackChannel::new(Box::new(transport.clone()), Box::new(audio.clone())),
                speaker: Box::new(speaker.clone()),
            };
            let settings = SessionSettings {
                server_url: "ws://localhost:8000/ws".to_string(),
                jpeg_quality: 0.7,
                canvas_width: 16,
                canvas_height: 12,
                rules_enabled,
                activity: Activity::Cricket,
            };

            Self {
                session: SessionController::new(parts, settings),
                capture,
                landmarks,
                renderer,
                transport,
                audio,
                speaker,
            }
        }

        fn go_live(&mut self) {
            self.session.set_camera_enabled(true);
            self.transport.push(TransportEvent::Connected);
            self.session.pump();
            assert_eq!(self.session.phase(), SessionPhase::Live);
        }

        fn with_landmarks(&self, landmarks: PoseLandmarks) {
            *self.landmarks.result.lock().unwrap() = Some(landmarks);
        }

        fn draws(&self) -> usize {
            *self.renderer.0.lock().unwrap()
        }

        /// Pumps until `done` holds; analysis results arrive from another thread.
        fn pump_until(&mut self, done: impl Fn(&SessionController) -> bool) {
            let deadline = Instant::now() + Duration::from_secs(2);
            while !done(&self.session) {
                assert!(Instant::now() < deadline, "session did not settle in time");
                self.session.pump();
                thread::sleep(Duration::from_millis(5));
            }
        }

        /// Delivers one frame and waits until the session has drawn it.
        fn process(&mut self, frame: Frame) {
            let drawn = self.session.stats().frames_drawn;
            self.capture.deliver(frame);
            self.pump_until(|session| session.stats().frames_drawn > drawn);
        }
    }

    fn frame(shade: u8) -> Frame {
        Frame::new([shade, 255 - shade, shade / 2, 255].repeat(16 * 12), 16, 12)
    }

    fn pose() -> PoseLandmarks {
        PoseLandmarks::new([Landmark::new(0.5, 0.5, 1.0); NUM_POSE_LANDMARKS], 0.9)
    }

    #[test]
    fn enable_opens_channel_and_starts_capture() {
        let mut h = Harness::new(false);
        h.session.set_camera_enabled(true);

        assert_eq!(h.session.phase(), SessionPhase::Starting);
        assert_eq!(h.transport.log().connects, vec!["ws://localhost:8000/ws".to_string()]);
        assert!(h.capture.log().running);

        h.transport.push(TransportEvent::Connected);
        assert!(h.session.pump());
        assert_eq!(h.session.phase(), SessionPhase::Live);
    }

    #[test]
    fn toggles_never_leak_camera_handles() {
        let mut h = Harness::new(false);
        for enabled in [true, true, false, true, false, false, true, true, false] {
            h.session.set_camera_enabled(enabled);
            assert_eq!(h.session.camera_enabled(), enabled);
        }

        let log = h.capture.log();
        assert_eq!(log.acquires, 3);
        assert_eq!(log.acquires, log.releases);
        assert!(!log.overlapped);
    }

    #[test]
    fn disable_closes_channel_in_every_state() {
        // still opening
        let mut h = Harness::new(false);
        h.session.set_camera_enabled(true);
        h.session.set_camera_enabled(false);
        assert_eq!(h.transport.log().disconnects, 1);
        assert_eq!(h.session.channel_state(), ChannelState::Closed);

        // open
        let mut h = Harness::new(false);
        h.go_live();
        h.session.set_camera_enabled(false);
        assert_eq!(h.transport.log().disconnects, 1);
        assert_eq!(h.session.channel_state(), ChannelState::Closed);

        // already closed by the peer
        let mut h = Harness::new(false);
        h.go_live();
        h.transport.push(TransportEvent::Disconnected(None));
        h.session.pump();
        assert_eq!(h.session.phase(), SessionPhase::Offline);
        h.session.set_camera_enabled(false);
        assert_eq!(h.transport.log().disconnects, 1);
        assert_eq!(h.session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn unrecognized_events_leave_presentation_alone() {
        let mut h = Harness::new(false);
        h.go_live();
        h.transport
            .push(TransportEvent::Text(r#"{"type":"progress","message":"50%"}"#.to_string()));
        h.transport.push(TransportEvent::Text("<html>".to_string()));
        h.session.pump();

        assert_eq!(h.session.feedback(), None);
        assert!(h.audio.played().is_empty());
        assert_eq!(h.session.phase(), SessionPhase::Live);
    }

    #[test]
    fn audio_feedback_updates_message_and_plays_once() {
        let mut h = Harness::new(false);
        h.go_live();
        h.transport
            .push(audio_feedback("Lead with a high elbow for a better drive.", b"mp3"));
        h.session.pump();

        assert_eq!(
            h.session.feedback(),
            Some("Lead with a high elbow for a better drive.")
        );
        assert_eq!(h.audio.played().len(), 1);

        h.transport.push(audio_feedback("Bend your front knee more.", b"mp3-2"));
        h.session.pump();
        assert_eq!(h.session.feedback(), Some("Bend your front knee more."));
        assert_eq!(h.audio.played().len(), 2);
    }

    #[test]
    fn activity_change_restarts_pipeline_in_order() {
        let mut h = Harness::new(false);
        h.go_live();
        h.session.set_activity(Activity::Basketball);

        assert_eq!(h.session.activity(), Activity::Basketball);
        assert_eq!(
            h.capture.log().calls,
            vec![CaptureCall::Start, CaptureCall::Stop, CaptureCall::Start]
        );
        assert!(!h.capture.log().overlapped);
        assert_eq!(h.transport.log().disconnects, 1);
        assert_eq!(h.transport.log().connects.len(), 2);
        assert_eq!(h.session.phase(), SessionPhase::Starting);
        assert!(h.session.camera_enabled());
    }

    #[test]
    fn activity_change_while_idle_only_records_choice() {
        let mut h = Harness::new(false);
        h.session.set_activity(Activity::Fitness);
        h.session.set_activity(Activity::Fitness);

        assert_eq!(h.session.activity(), Activity::Fitness);
        assert!(h.capture.log().calls.is_empty());
        assert!(h.transport.log().connects.is_empty());
    }

    #[test]
    fn unknown_activity_name_is_rejected() {
        let mut h = Harness::new(false);
        assert!(h.session.set_activity_name("quidditch").is_err());
        assert_eq!(h.session.activity(), Activity::Cricket);

        h.session.set_activity_name("tennis").unwrap();
        assert_eq!(h.session.activity(), Activity::Tennis);
    }

    #[test]
    fn five_frames_then_disable() {
        let mut h = Harness::new(false);
        h.with_landmarks(pose());
        h.go_live();

        for shade in [10u8, 60, 110, 160, 210] {
            h.process(frame(shade));
        }

        assert_eq!(h.draws(), 5);
        assert_eq!(*h.landmarks.calls.lock().unwrap(), 5);
        let sent = h.transport.log().sent.clone();
        assert_eq!(sent.len(), 5);
        assert!(sent.iter().all(|p| p.starts_with("data:image/jpeg;base64,")));
        let mut distinct = sent.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), 5);
        assert_eq!(h.session.stats().frames_sent, 5);
        assert!(!h.session.canvas().is_blank());

        h.session.set_camera_enabled(false);
        let log = h.capture.log();
        assert!(!log.running);
        assert_eq!(log.acquires, log.releases);
        assert_eq!(h.transport.log().disconnects, 1);
        assert_eq!(h.session.channel_state(), ChannelState::Closed);
        assert!(h.session.canvas().is_blank());
        assert_eq!(h.session.phase(), SessionPhase::Idle);
    }

    #[test]
    fn frames_render_without_channel() {
        let mut h = Harness::new(false);
        h.session.set_camera_enabled(true);
        h.process(frame(40));

        assert_eq!(h.session.phase(), SessionPhase::Starting);
        assert_eq!(h.session.stats().frames_drawn, 1);
        assert!(h.transport.log().sent.is_empty());
        assert_eq!(h.draws(), 0);
    }

    #[test]
    fn channel_loss_keeps_local_overlay_running() {
        let mut h = Harness::new(false);
        h.with_landmarks(pose());
        h.go_live();
        h.transport
            .push(TransportEvent::Disconnected(Some("connection reset".to_string())));
        h.session.pump();

        assert_eq!(h.session.phase(), SessionPhase::Offline);
        assert!(h.session.last_error().unwrap().contains("connection reset"));

        h.process(frame(90));
        assert_eq!(h.draws(), 1);
        assert!(h.transport.log().sent.is_empty());
        assert!(h.capture.log().running);
    }

    #[test]
    fn camera_failure_surfaces_error_and_closes_channel() {
        let mut h = Harness::new(false);
        h.capture.log().fail_next = true;
        h.session.set_camera_enabled(true);

        assert_eq!(h.session.phase(), SessionPhase::Idle);
        assert!(!h.session.camera_enabled());
        assert!(h.session.last_error().unwrap().contains("permission denied"));
        assert_eq!(h.transport.log().disconnects, 1);
        assert_eq!(h.session.channel_state(), ChannelState::Closed);

        h.session.set_camera_enabled(true);
        assert!(h.session.camera_enabled());
        assert_eq!(h.session.last_error(), None);
    }

    #[test]
    fn bad_endpoint_leaves_capture_running_offline() {
        let mut h = Harness::new(false);
        h.transport.log().fail_connect = true;
        h.session.set_camera_enabled(true);

        assert_eq!(h.session.phase(), SessionPhase::Offline);
        assert!(h.capture.log().running);
        assert!(h.session.last_error().is_some());
    }

    #[test]
    fn capture_thread_exit_ends_session() {
        let mut h = Harness::new(false);
        h.go_live();
        h.capture.log().frame_tx = None;

        h.pump_until(|session| session.phase() == SessionPhase::Idle);
        assert!(!h.session.camera_enabled());
        assert_eq!(
            h.session.last_error(),
            Some(SessionError::CaptureEnded.to_string().as_str())
        );
        assert_eq!(h.transport.log().disconnects, 1);
    }

    #[test]
    fn rules_speak_each_new_message_once() {
        let mut h = Harness::new(true);
        h.session.set_activity(Activity::Basketball);
        let mut points = [Landmark::new(0.5, 0.5, 1.0); NUM_POSE_LANDMARKS];
        points[idx::LEFT_ELBOW] = Landmark::new(0.5, 0.5, 1.0);
        points[idx::LEFT_WRIST] = Landmark::new(0.5, 0.7, 1.0);
        h.with_landmarks(PoseLandmarks::new(points, 0.9));
        h.session.set_camera_enabled(true);

        h.process(frame(1));
        h.process(frame(2));

        let bad = "Raise your wrist above your elbow for better form.";
        assert_eq!(h.session.feedback(), Some(bad));
        assert_eq!(
            h.speaker.calls(),
            vec![SpeechCall::Cancel, SpeechCall::Speak(bad.to_string())]
        );

        points[idx::LEFT_WRIST] = Landmark::new(0.5, 0.3, 1.0);
        h.with_landmarks(PoseLandmarks::new(points, 0.9));
        h.process(frame(3));

        let good = "Good shot form! Wrist above elbow.";
        assert_eq!(h.session.feedback(), Some(good));
        assert_eq!(
            h.speaker.calls()[2..],
            [SpeechCall::Cancel, SpeechCall::Speak(good.to_string())]
        );
    }

    #[test]
    fn rules_disabled_stay_silent() {
        let mut h = Harness::new(false);
        h.with_landmarks(pose());
        h.session.set_camera_enabled(true);
        h.process(frame(5));

        assert_eq!(h.session.feedback(), None);
        assert!(h.speaker.calls().is_empty());
    }

    #[test]
    fn analysis_survives_activity_restart() {
        let mut h = Harness::new(false);
        h.with_landmarks(pose());
        h.go_live();
        h.process(frame(20));

        h.session.set_activity(Activity::Tennis);
        h.transport.push(TransportEvent::Connected);
        h.process(frame(30));

        assert_eq!(h.draws(), 2);
        assert_eq!(*h.landmarks.calls.lock().unwrap(), 2);
        assert_eq!(h.session.phase(), SessionPhase::Live);
    }

    #[test]
    fn pump_returns_while_analysis_is_busy() {
        let mut h = Harness::new(false);
        *h.landmarks.delay.lock().unwrap() = Duration::from_millis(300);
        h.go_live();
        h.capture.deliver(frame(50));

        let started = Instant::now();
        assert!(!h.session.pump());
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(h.session.stats().frames_drawn, 0);

        h.pump_until(|session| session.stats().frames_drawn == 1);
    }

    #[test]
    fn stats_include_channel_drops_and_ignored_events() {
        let mut h = Harness::new(false);
        h.go_live();
        h.transport.log().reject_sends = true;
        h.process(frame(70));
        h.transport
            .push(TransportEvent::Text(r#"{"type":"progress","message":"50%"}"#.to_string()));
        h.session.pump();

        assert_eq!(
            h.session.stats(),
            SessionStats {
                frames_drawn: 1,
                frames_skipped: 0,
                frames_sent: 0,
                sends_dropped: 1,
                events_ignored: 1,
            }
        );
    }

    #[test]
    fn drop_releases_everything() {
        let h = Harness::new(false);
        let capture = h.capture.clone();
        let transport = h.transport.clone();
        let Harness { mut session, .. } = h;
        session.set_camera_enabled(true);
        drop(session);

        let log = capture.log();
        assert_eq!(log.acquires, log.releases);
        assert!(transport.log().disconnects >= 1);
    }
}

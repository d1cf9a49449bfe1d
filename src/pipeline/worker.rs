//! Frame analysis off the UI thread: pose inference, overlay drawing and
//! snapshot encoding for the newest captured frame.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

use super::{Canvas, LandmarkSource, OverlayRenderer};
use crate::types::{Frame, PoseLandmarks};

const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);
// Frames older than this are skipped instead of analysed.
const STALE_FRAME_AGE: Duration = Duration::from_secs(1);

/// The inference and drawing stages. Moved into the worker while it runs and
/// handed back when it stops.
pub struct AnalysisStages {
    pub landmarks: Box<dyn LandmarkSource>,
    pub renderer: Box<dyn OverlayRenderer>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AnalysisSettings {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: f32,
}

/// One analysed frame: the annotated surface, the detected pose, and the
/// encoded snapshot when uploads were enabled.
#[derive(Clone, Debug)]
pub struct FrameAnalysis {
    pub canvas: Canvas,
    pub landmarks: Option<PoseLandmarks>,
    pub snapshot: Option<String>,
    /// Frames discarded since the previous delivered analysis.
    pub frames_skipped: u64,
}

pub struct AnalysisWorker {
    stop: Arc<AtomicBool>,
    upload: Arc<AtomicBool>,
    results: Receiver<FrameAnalysis>,
    handle: Option<thread::JoinHandle<AnalysisStages>>,
}

impl AnalysisWorker {
    pub fn spawn(
        stages: AnalysisStages,
        frame_rx: Receiver<Frame>,
        settings: AnalysisSettings,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let upload = Arc::new(AtomicBool::new(false));
        let (result_tx, results) = bounded(1);

        let handle = {
            let stop = stop.clone();
            let upload = upload.clone();
            thread::spawn(move || run(stages, frame_rx, result_tx, stop, upload, settings))
        };

        Self {
            stop,
            upload,
            results,
            handle: Some(handle),
        }
    }

    /// Whether analysed frames should carry an encoded snapshot.
    pub fn set_upload(&self, enabled: bool) {
        self.upload.store(enabled, Ordering::Relaxed);
    }

    pub fn results(&self) -> &Receiver<FrameAnalysis> {
        &self.results
    }

    /// Stops the worker and returns its stages. `None` if the worker panicked.
    pub fn stop(mut self) -> Option<AnalysisStages> {
        self.halt()
    }

    fn halt(&mut self) -> Option<AnalysisStages> {
        self.stop.store(true, Ordering::SeqCst);
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(stages) => Some(stages),
            Err(_) => {
                log::error!("frame analysis worker panicked");
                None
            }
        }
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.halt();
    }
}

fn recv_latest_frame(
    frame_rx: &Receiver<Frame>,
    skipped: &mut u64,
) -> Result<Frame, RecvTimeoutError> {
    let mut frame = frame_rx.recv_timeout(STOP_POLL_INTERVAL)?;
    // Drop stale frames if analysis is still busy to avoid backlog.
    while let Ok(newer) = frame_rx.try_recv() {
        frame = newer;
        *skipped += 1;
    }
    Ok(frame)
}

fn run(
    mut stages: AnalysisStages,
    frame_rx: Receiver<Frame>,
    result_tx: Sender<FrameAnalysis>,
    stop: Arc<AtomicBool>,
    upload: Arc<AtomicBool>,
    settings: AnalysisSettings,
) -> AnalysisStages {
    let mut canvas = Canvas::new(settings.width, settings.height);
    let mut skipped = 0;

    while !stop.load(Ordering::SeqCst) {
        let frame = match recv_latest_frame(&frame_rx, &mut skipped) {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("frame source closed, analysis worker exiting");
                break;
            }
        };

        let age = frame.timestamp.elapsed();
        if age > STALE_FRAME_AGE {
            log::debug!("skipping frame captured {age:?} ago");
            skipped += 1;
            continue;
        }

        let quality = upload
            .load(Ordering::Relaxed)
            .then_some(settings.jpeg_quality);
        let mut analysis = analyze(&mut stages, &mut canvas, &frame, quality);
        analysis.frames_skipped = skipped;
        match result_tx.try_send(analysis) {
            Ok(()) => skipped = 0,
            // The session has not taken the previous result yet.
            Err(TrySendError::Full(_)) => skipped += 1,
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    stages
}

fn analyze(
    stages: &mut AnalysisStages,
    canvas: &mut Canvas,
    frame: &Frame,
    jpeg_quality: Option<f32>,
) -> FrameAnalysis {
    let landmarks = stages.landmarks.detect(frame).unwrap_or_else(|err| {
        log::warn!("pose inference failed: {err:?}");
        None
    });

    canvas.clear();
    if let Err(err) = canvas.draw_frame(frame) {
        log::warn!("failed to draw frame: {err:?}");
    }
    if let Some(landmarks) = &landmarks {
        stages.renderer.draw(canvas, landmarks);
    }

    let snapshot = jpeg_quality.and_then(|quality| match canvas.encode_jpeg_data_url(quality) {
        Ok(payload) => Some(payload),
        Err(err) => {
            log::warn!("failed to encode frame snapshot: {err:?}");
            None
        }
    });

    FrameAnalysis {
        canvas: canvas.clone(),
        landmarks,
        snapshot,
        frames_skipped: 0,
    }
}

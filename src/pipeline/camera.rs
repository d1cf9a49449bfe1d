use crossbeam_channel::Sender;

use crate::{error::SessionError, types::Frame};

/// A camera-driven frame source. `start` acquires the device and begins
/// delivering frames; `stop` halts delivery and releases the device.
pub trait CaptureSource: Send {
    fn start(&mut self, frame_tx: Sender<Frame>) -> Result<(), SessionError>;
    /// Idempotent; returns once the device handle has been released.
    fn stop(&mut self);
}

/// Used when the binary is built without a camera backend.
#[derive(Debug, Default)]
pub struct NoCamera;

impl CaptureSource for NoCamera {
    fn start(&mut self, _frame_tx: Sender<Frame>) -> Result<(), SessionError> {
        Err(SessionError::CameraUnavailable(
            "built without a camera backend".to_string(),
        ))
    }

    fn stop(&mut self) {}
}

#[cfg(feature = "camera-nokhwa")]
pub use self::native::{CameraDevice, NokhwaCapture, available_cameras};

#[cfg(feature = "camera-nokhwa")]
mod native {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread,
        time::Instant,
    };

    use anyhow::{Result, anyhow};
    use crossbeam_channel::{Sender, bounded};
    use nokhwa::{
        Camera,
        pixel_format::RgbAFormat,
        query,
        utils::{
            ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat,
            RequestedFormatType,
        },
    };

    use super::CaptureSource;
    use crate::{config::CameraConfig, error::SessionError, types::Frame};

    // Consecutive read failures after which the device is treated as gone.
    const MAX_CONSECUTIVE_FAILURES: u32 = 30;

    #[derive(Clone, Debug)]
    pub struct CameraDevice {
        pub index: CameraIndex,
        pub label: String,
    }

    pub fn available_cameras() -> Result<Vec<CameraDevice>> {
        let cameras = query(ApiBackend::Auto)?;
        Ok(cameras
            .into_iter()
            .map(|info| CameraDevice {
                index: info.index().clone(),
                label: info.human_name(),
            })
            .collect())
    }

    struct CaptureThread {
        stop: Arc<AtomicBool>,
        handle: Option<thread::JoinHandle<()>>,
    }

    impl CaptureThread {
        fn halt(&mut self) {
            self.stop.store(true, Ordering::SeqCst);
            if let Some(handle) = self.handle.take() {
                let _ = handle.join();
            }
        }
    }

    impl Drop for CaptureThread {
        fn drop(&mut self) {
            self.halt();
        }
    }

    /// Camera capture on a dedicated thread. The device is opened and closed
    /// on that thread, so joining it guarantees the handle is released.
    pub struct NokhwaCapture {
        index: CameraIndex,
        width: u32,
        height: u32,
        running: Option<CaptureThread>,
    }

    impl NokhwaCapture {
        pub fn new(config: &CameraConfig) -> Self {
            Self {
                index: CameraIndex::Index(config.index),
                width: config.width,
                height: config.height,
                running: None,
            }
        }
    }

    fn requested_formats(width: u32, height: u32) -> [RequestedFormat<'static>; 3] {
        [
            RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(
                CameraFormat::new_from(width, height, FrameFormat::MJPEG, 30),
            )),
            RequestedFormat::new::<RgbAFormat>(RequestedFormatType::AbsoluteHighestFrameRate),
            RequestedFormat::new::<RgbAFormat>(RequestedFormatType::None),
        ]
    }

    fn open_camera(index: &CameraIndex, width: u32, height: u32) -> Result<Camera> {
        let mut last_err = None;
        for requested in requested_formats(width, height) {
            match Camera::new(index.clone(), requested) {
                Ok(mut camera) => match camera.open_stream() {
                    Ok(()) => return Ok(camera),
                    Err(err) => last_err = Some(err.into()),
                },
                Err(err) => last_err = Some(err.into()),
            }
        }
        Err(last_err.unwrap_or_else(|| anyhow!("failed to open camera with any supported format")))
    }

    impl CaptureSource for NokhwaCapture {
        fn start(&mut self, frame_tx: Sender<Frame>) -> Result<(), SessionError> {
            self.stop();

            let stop = Arc::new(AtomicBool::new(false));
            let stop_flag = stop.clone();
            let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
            let (index, width, height) = (self.index.clone(), self.width, self.height);

            let handle = thread::spawn(move || {
                let mut camera = match open_camera(&index, width, height) {
                    Ok(camera) => {
                        let _ = ready_tx.send(Ok(()));
                        camera
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!("{err:#}")));
                        return;
                    }
                };
                log::info!("camera {index:?} opened at {:?}", camera.resolution());

                let mut failures = 0u32;
                while !stop_flag.load(Ordering::Relaxed) {
                    if failures >= MAX_CONSECUTIVE_FAILURES {
                        log::error!("camera {index:?} stopped delivering frames");
                        break;
                    }
                    let started = Instant::now();
                    let buffer = match camera.frame() {
                        Ok(buffer) => buffer,
                        Err(err) => {
                            failures += 1;
                            log::warn!(
                                "camera frame read failed (after {:?}): {err:?}",
                                started.elapsed()
                            );
                            continue;
                        }
                    };
                    let decoded = match buffer.decode_image::<RgbAFormat>() {
                        Ok(image) => image,
                        Err(err) => {
                            failures += 1;
                            log::warn!("failed to decode camera frame: {err:?}");
                            continue;
                        }
                    };

                    failures = 0;
                    let (width, height) = decoded.dimensions();
                    let frame = Frame::new(decoded.into_raw(), width, height);
                    // A full queue means the session has not consumed the previous frame yet.
                    let _ = frame_tx.try_send(frame);
                }

                if let Err(err) = camera.stop_stream() {
                    log::warn!("failed to stop camera stream: {err:?}");
                }
                log::info!("camera {index:?} released");
            });

            let mut thread = CaptureThread {
                stop,
                handle: Some(handle),
            };
            match ready_rx.recv() {
                Ok(Ok(())) => {
                    self.running = Some(thread);
                    Ok(())
                }
                Ok(Err(message)) => {
                    thread.halt();
                    Err(SessionError::CameraUnavailable(message))
                }
                Err(_) => {
                    thread.halt();
                    Err(SessionError::CameraUnavailable(
                        "capture thread exited before opening the camera".to_string(),
                    ))
                }
            }
        }

        fn stop(&mut self) {
            if let Some(mut thread) = self.running.take() {
                thread.halt();
            }
        }
    }
}

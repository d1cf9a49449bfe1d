pub mod camera;
pub mod canvas;
pub mod landmarks;
pub mod skeleton;
pub mod worker;

// Re-exports for convenience
pub use camera::{CaptureSource, NoCamera};
#[cfg(feature = "camera-nokhwa")]
pub use camera::{CameraDevice, NokhwaCapture, available_cameras};
pub use canvas::Canvas;
pub use landmarks::{LandmarkSource, OrtPoseSource};
pub use skeleton::{OverlayRenderer, SkeletonRenderer};
pub use worker::{AnalysisSettings, AnalysisStages, AnalysisWorker, FrameAnalysis};

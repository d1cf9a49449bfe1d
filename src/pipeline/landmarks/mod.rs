mod common;
mod ort;

pub use self::common::{LetterboxInfo, POSE_INPUT_SIZE, decode_pose_landmarks, prepare_frame};
pub use self::ort::OrtPoseSource;

use crate::types::{Frame, PoseLandmarks};

/// Turns a frame into body landmarks. `Ok(None)` means nobody was detected.
pub trait LandmarkSource: Send {
    fn detect(&mut self, frame: &Frame) -> anyhow::Result<Option<PoseLandmarks>>;
}

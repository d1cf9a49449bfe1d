use std::path::Path;

use anyhow::{Context, Result, anyhow};
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;

use super::{
    LandmarkSource,
    common::{POSE_INPUT_SIZE, decode_pose_landmarks, prepare_frame},
};
use crate::types::{Frame, PoseLandmarks};

// The full-body model emits 39 points (33 body + 6 auxiliary) of 5 values each.
const LANDMARK_OUTPUT_LEN: usize = 39 * 5;

/// MediaPipe pose-landmark model on ONNX Runtime, run on the whole
/// letterboxed frame.
pub struct OrtPoseSource {
    session: Session,
    min_confidence: f32,
}

impl OrtPoseSource {
    pub fn new(model_path: &Path, min_confidence: f32) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)
            .with_context(|| format!("failed to load pose model from {}", model_path.display()))?;

        log::info!("pose ORT backend ready using {}", model_path.display());
        Ok(Self {
            session,
            min_confidence,
        })
    }
}

impl LandmarkSource for OrtPoseSource {
    fn detect(&mut self, frame: &Frame) -> Result<Option<PoseLandmarks>> {
        let (input, letterbox) = prepare_frame(frame, POSE_INPUT_SIZE)?;
        let tensor = Tensor::from_array(input)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .context("failed to run pose session")?;

        // Output order differs between exports, so pick tensors by size.
        let mut landmarks: Option<Vec<f32>> = None;
        let mut confidence: Option<f32> = None;
        for idx in 0..outputs.len() {
            let Ok(values) = outputs[idx].try_extract_array::<f32>() else {
                continue;
            };
            match values.len() {
                LANDMARK_OUTPUT_LEN if landmarks.is_none() => {
                    landmarks = Some(values.iter().copied().collect());
                }
                1 if confidence.is_none() => {
                    confidence = values.iter().next().copied();
                }
                _ => {}
            }
        }

        let landmarks = landmarks.ok_or_else(|| anyhow!("pose model returned no landmark tensor"))?;
        let confidence = confidence.unwrap_or(0.0).clamp(0.0, 1.0);
        if confidence < self.min_confidence {
            return Ok(None);
        }

        decode_pose_landmarks(&landmarks, &letterbox, confidence).map(Some)
    }
}

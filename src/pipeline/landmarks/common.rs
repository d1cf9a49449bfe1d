use anyhow::{Context, Result, anyhow};
use fast_image_resize as fir;
use ndarray::Array4;
use rayon::prelude::*;

use crate::types::{Frame, Landmark, NUM_POSE_LANDMARKS, PoseLandmarks};

pub const POSE_INPUT_SIZE: u32 = 256;
// x, y, z, visibility, presence
const VALUES_PER_LANDMARK: usize = 5;

#[derive(Clone, Debug, PartialEq)]
pub struct LetterboxInfo {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub orig_w: u32,
    pub orig_h: u32,
}

impl LetterboxInfo {
    /// Maps a point in model input pixels back to normalized frame coordinates.
    pub fn to_normalized(&self, x: f32, y: f32) -> (f32, f32) {
        let fx = (x - self.pad_x) / self.scale;
        let fy = (y - self.pad_y) / self.scale;
        (
            (fx / self.orig_w.max(1) as f32).clamp(0.0, 1.0),
            (fy / self.orig_h.max(1) as f32).clamp(0.0, 1.0),
        )
    }
}

/// Letterboxes `frame` into a `target_size` square and returns an NHWC tensor in 0..1.
pub fn prepare_frame(frame: &Frame, target_size: u32) -> Result<(Array4<f32>, LetterboxInfo)> {
    if frame.rgba.len() != frame.expected_len() || frame.width == 0 || frame.height == 0 {
        return Err(anyhow!(
            "frame buffer size mismatch: got {}, expected {}",
            frame.rgba.len(),
            frame.expected_len()
        ));
    }

    let scale = target_size as f32 / frame.width.max(frame.height) as f32;
    let new_w = ((frame.width as f32 * scale).round() as u32).clamp(1, target_size);
    let new_h = ((frame.height as f32 * scale).round() as u32).clamp(1, target_size);

    let src = fir::images::Image::from_vec_u8(
        frame.width,
        frame.height,
        frame.rgba.clone(),
        fir::PixelType::U8x4,
    )?;
    let mut dst = fir::images::Image::new(new_w, new_h, fir::PixelType::U8x4);
    let options = fir::ResizeOptions::new()
        .resize_alg(fir::ResizeAlg::Interpolation(fir::FilterType::Bilinear));
    fir::Resizer::new()
        .resize(&src, &mut dst, Some(&options))
        .context("fast resize failed")?;
    let resized = dst.into_vec();

    let side = target_size as usize;
    let pad_x = (side - new_w as usize) / 2;
    let pad_y = (side - new_h as usize) / 2;
    let row_len = new_w as usize;

    // Padding stays black; each output row copies the matching resized row.
    let mut input = vec![0f32; side * side * 3];
    input
        .par_chunks_mut(side * 3)
        .enumerate()
        .for_each(|(y, row)| {
            if y < pad_y || y >= pad_y + new_h as usize {
                return;
            }
            let src_row = &resized[(y - pad_y) * row_len * 4..(y - pad_y + 1) * row_len * 4];
            for (x, px) in src_row.chunks_exact(4).enumerate() {
                let dst = &mut row[(pad_x + x) * 3..(pad_x + x) * 3 + 3];
                dst[0] = px[0] as f32 / 255.0;
                dst[1] = px[1] as f32 / 255.0;
                dst[2] = px[2] as f32 / 255.0;
            }
        });

    let tensor = Array4::<f32>::from_shape_vec((1, side, side, 3), input)
        .map_err(|err| anyhow!("failed to build input tensor: {err}"))?;

    Ok((
        tensor,
        LetterboxInfo {
            scale,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
            orig_w: frame.width,
            orig_h: frame.height,
        },
    ))
}

fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

/// Decodes the flat landmark output (5 values per point, model input pixels)
/// into the 33 body landmarks in normalized frame coordinates.
pub fn decode_pose_landmarks(
    flat: &[f32],
    letterbox: &LetterboxInfo,
    score: f32,
) -> Result<PoseLandmarks> {
    if flat.len() < NUM_POSE_LANDMARKS * VALUES_PER_LANDMARK {
        return Err(anyhow!(
            "unexpected landmarks length: got {}, need {}",
            flat.len(),
            NUM_POSE_LANDMARKS * VALUES_PER_LANDMARK
        ));
    }

    let depth_scale = letterbox.scale * letterbox.orig_w.max(1) as f32;
    let points: Vec<Landmark> = flat
        .chunks_exact(VALUES_PER_LANDMARK)
        .take(NUM_POSE_LANDMARKS)
        .map(|v| {
            let (x, y) = letterbox.to_normalized(v[0], v[1]);
            Landmark {
                x,
                y,
                z: v[2] / depth_scale,
                visibility: sigmoid(v[3]),
            }
        })
        .collect();

    PoseLandmarks::from_slice(&points, score)
        .ok_or_else(|| anyhow!("decoded {} landmarks", points.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letterbox_pads_the_short_side() {
        let frame = Frame::new(vec![255u8; 64 * 32 * 4], 64, 32);
        let (tensor, letterbox) = prepare_frame(&frame, 16).unwrap();

        assert_eq!(tensor.shape(), &[1, 16, 16, 3]);
        assert_eq!(letterbox.pad_x, 0.0);
        assert_eq!(letterbox.pad_y, 4.0);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        assert!((tensor[[0, 8, 8, 0]] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let frame = Frame::new(vec![0u8; 12], 64, 32);
        assert!(prepare_frame(&frame, 16).is_err());
    }

    #[test]
    fn normalizes_through_letterbox() {
        let letterbox = LetterboxInfo {
            scale: 0.5,
            pad_x: 0.0,
            pad_y: 32.0,
            orig_w: 512,
            orig_h: 384,
        };
        let (x, y) = letterbox.to_normalized(128.0, 128.0);
        assert!((x - 0.5).abs() < 1e-6);
        assert!((y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn decodes_landmarks_and_visibility() {
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 256,
            orig_h: 256,
        };
        let mut flat = vec![0f32; 39 * VALUES_PER_LANDMARK];
        flat[13 * 5] = 64.0;
        flat[13 * 5 + 1] = 192.0;
        flat[13 * 5 + 3] = 10.0;

        let set = decode_pose_landmarks(&flat, &letterbox, 0.8).unwrap();
        let elbow = set.get(13).unwrap();
        assert!((elbow.x - 0.25).abs() < 1e-6);
        assert!((elbow.y - 0.75).abs() < 1e-6);
        assert!(elbow.visibility > 0.99);
        assert!((set.get(0).unwrap().visibility - 0.5).abs() < 1e-6);
        assert_eq!(set.score, 0.8);
    }

    #[test]
    fn short_output_is_an_error() {
        let letterbox = LetterboxInfo {
            scale: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
            orig_w: 1,
            orig_h: 1,
        };
        assert!(decode_pose_landmarks(&[0.0; 20], &letterbox, 1.0).is_err());
    }
}

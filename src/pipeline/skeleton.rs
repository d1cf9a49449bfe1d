use super::canvas::Canvas;
use crate::types::PoseLandmarks;

/// Body connections of the 33-point BlazePose topology.
pub const POSE_CONNECTIONS: &[(usize, usize)] = &[
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 7),
    (0, 4),
    (4, 5),
    (5, 6),
    (6, 8),
    (9, 10),
    (11, 12),
    (11, 13),
    (13, 15),
    (15, 17),
    (15, 19),
    (15, 21),
    (17, 19),
    (12, 14),
    (14, 16),
    (16, 18),
    (16, 20),
    (16, 22),
    (18, 20),
    (11, 23),
    (12, 24),
    (23, 24),
    (23, 25),
    (24, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (28, 30),
    (29, 31),
    (30, 32),
    (27, 31),
    (28, 32),
];

const CONNECTION_COLOR: [u8; 4] = [0, 255, 0, 255];
const CONNECTION_WIDTH: f32 = 4.0;
const POINT_COLOR: [u8; 4] = [255, 0, 0, 255];
const POINT_RADIUS: f32 = 2.5;

/// Paints a landmark set onto the drawing surface.
pub trait OverlayRenderer: Send {
    fn draw(&mut self, canvas: &mut Canvas, landmarks: &PoseLandmarks);
}

#[derive(Clone, Debug)]
pub struct SkeletonRenderer {
    min_visibility: f32,
}

impl SkeletonRenderer {
    pub fn new(min_visibility: f32) -> Self {
        Self { min_visibility }
    }
}

impl Default for SkeletonRenderer {
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl OverlayRenderer for SkeletonRenderer {
    fn draw(&mut self, canvas: &mut Canvas, landmarks: &PoseLandmarks) {
        let (w, h) = (canvas.width() as f32, canvas.height() as f32);
        let visible = |idx: usize| {
            landmarks
                .get(idx)
                .filter(|lm| lm.visibility >= self.min_visibility)
                .map(|lm| (lm.x * w, lm.y * h))
        };

        for &(a, b) in POSE_CONNECTIONS {
            if let (Some(pa), Some(pb)) = (visible(a), visible(b)) {
                canvas.stroke_segment(pa, pb, CONNECTION_WIDTH, CONNECTION_COLOR);
            }
        }

        for idx in 0..landmarks.points().len() {
            if let Some((x, y)) = visible(idx) {
                canvas.fill_disc(x, y, POINT_RADIUS, POINT_COLOR);
            }
        }
    }
}

use std::{fmt, str::FromStr, time::Instant};

use serde::{Deserialize, Serialize};

use crate::error::ActivityParseError;

#[derive(Clone, Debug)]
pub struct Frame {
    pub rgba: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
}

impl Frame {
    pub fn new(rgba: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            rgba,
            width,
            height,
            timestamp: Instant::now(),
        }
    }

    pub fn expected_len(&self) -> usize {
        (self.width as usize)
            .saturating_mul(self.height as usize)
            .saturating_mul(4)
    }
}

/// A body keypoint in normalized image coordinates (0..1, y grows downward).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, visibility: f32) -> Self {
        Self {
            x,
            y,
            z: 0.0,
            visibility,
        }
    }
}

/// Number of body landmarks in the BlazePose topology.
pub const NUM_POSE_LANDMARKS: usize = 33;

/// Index names for the landmarks referenced by the overlay and the activity rules.
pub mod landmark_index {
    pub const NOSE: usize = 0;
    pub const LEFT_SHOULDER: usize = 11;
    pub const RIGHT_SHOULDER: usize = 12;
    pub const LEFT_ELBOW: usize = 13;
    pub const RIGHT_ELBOW: usize = 14;
    pub const LEFT_WRIST: usize = 15;
    pub const RIGHT_WRIST: usize = 16;
    pub const LEFT_HIP: usize = 23;
    pub const RIGHT_HIP: usize = 24;
    pub const LEFT_KNEE: usize = 25;
    pub const RIGHT_KNEE: usize = 26;
    pub const LEFT_ANKLE: usize = 27;
    pub const RIGHT_ANKLE: usize = 28;
}

/// The fixed-size landmark set produced for one frame.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseLandmarks {
    points: [Landmark; NUM_POSE_LANDMARKS],
    pub score: f32,
}

impl PoseLandmarks {
    pub fn new(points: [Landmark; NUM_POSE_LANDMARKS], score: f32) -> Self {
        Self { points, score }
    }

    /// Builds a set from a slice; returns `None` unless exactly
    /// [`NUM_POSE_LANDMARKS`] points are supplied.
    pub fn from_slice(points: &[Landmark], score: f32) -> Option<Self> {
        let points: [Landmark; NUM_POSE_LANDMARKS] = points.try_into().ok()?;
        Some(Self { points, score })
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activity {
    #[default]
    Cricket,
    Basketball,
    Tennis,
    Fitness,
}

impl Activity {
    pub const ALL: [Activity; 4] = [
        Activity::Cricket,
        Activity::Basketball,
        Activity::Tennis,
        Activity::Fitness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Activity::Cricket => "cricket",
            Activity::Basketball => "basketball",
            Activity::Tennis => "tennis",
            Activity::Fitness => "fitness",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Activity::Cricket => "Cricket",
            Activity::Basketball => "Basketball",
            Activity::Tennis => "Tennis",
            Activity::Fitness => "Fitness",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Activity {
    type Err = ActivityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Activity::ALL
            .into_iter()
            .find(|activity| activity.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ActivityParseError(s.to_string()))
    }
}

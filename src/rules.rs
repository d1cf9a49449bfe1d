//! Per-activity form checks on a landmark set. Each check compares a handful of
//! landmark coordinates and yields one short coaching message.

use crate::types::{Activity, Landmark, PoseLandmarks, landmark_index as idx};

const HEAD_OFFSET_LIMIT: f32 = 0.05;
const STANCE_MIN_RATIO: f32 = 0.8;
const STANCE_MAX_RATIO: f32 = 1.5;

pub fn evaluate(activity: Activity, landmarks: &PoseLandmarks) -> Option<&'static str> {
    match activity {
        Activity::Basketball => basketball(landmarks),
        Activity::Tennis => tennis(landmarks),
        Activity::Fitness => fitness(landmarks),
        Activity::Cricket => cricket_stance(landmarks),
    }
}

fn pick<const N: usize>(landmarks: &PoseLandmarks, indices: [usize; N]) -> Option<[Landmark; N]> {
    let mut out = [Landmark::default(); N];
    for (slot, index) in out.iter_mut().zip(indices) {
        *slot = *landmarks.get(index)?;
    }
    Some(out)
}

fn distance(a: &Landmark, b: &Landmark) -> f32 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

fn basketball(landmarks: &PoseLandmarks) -> Option<&'static str> {
    let [elbow, wrist] = pick(landmarks, [idx::LEFT_ELBOW, idx::LEFT_WRIST])?;
    Some(if wrist.y < elbow.y {
        "Good shot form! Wrist above elbow."
    } else {
        "Raise your wrist above your elbow for better form."
    })
}

fn tennis(landmarks: &PoseLandmarks) -> Option<&'static str> {
    let [shoulder, wrist] = pick(landmarks, [idx::LEFT_SHOULDER, idx::LEFT_WRIST])?;
    Some(if wrist.y < shoulder.y {
        "Nice racket swing motion!"
    } else {
        "Lift your arm higher for a stronger swing."
    })
}

fn fitness(landmarks: &PoseLandmarks) -> Option<&'static str> {
    let [hip, knee] = pick(landmarks, [idx::LEFT_HIP, idx::LEFT_KNEE])?;
    Some(if hip.y > knee.y {
        "Good squat depth!"
    } else {
        "Go lower to complete your squat."
    })
}

// Batting stance for a right-handed batter: head over the shoulders, feet
// about shoulder width apart, hands raised for the backlift.
fn cricket_stance(landmarks: &PoseLandmarks) -> Option<&'static str> {
    let [nose, l_shoulder, r_shoulder, l_elbow, l_wrist, l_ankle, r_ankle] = pick(
        landmarks,
        [
            idx::NOSE,
            idx::LEFT_SHOULDER,
            idx::RIGHT_SHOULDER,
            idx::LEFT_ELBOW,
            idx::LEFT_WRIST,
            idx::LEFT_ANKLE,
            idx::RIGHT_ANKLE,
        ],
    )?;

    let shoulder_mid_x = (l_shoulder.x + r_shoulder.x) / 2.0;
    if (nose.x - shoulder_mid_x).abs() > HEAD_OFFSET_LIMIT {
        return Some("Keep your head still and centered for better balance.");
    }

    let shoulder_width = distance(&l_shoulder, &r_shoulder);
    let foot_distance = distance(&l_ankle, &r_ankle);
    if foot_distance < shoulder_width * STANCE_MIN_RATIO {
        return Some("Widen your stance for better stability.");
    }
    if foot_distance > shoulder_width * STANCE_MAX_RATIO {
        return Some("Your stance is too wide, which may restrict movement.");
    }

    if l_wrist.y > l_elbow.y {
        return Some("Raise your hands for a proper backlift.");
    }

    None
}

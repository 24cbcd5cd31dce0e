//! Head pose estimation from sparse facial landmarks
//!
//! This is a heuristic geometric estimator, not a calibrated 3D pose solver.
//! It compares the nose tip against the eye corners (yaw) and against the
//! forehead-to-chin span (pitch). Expect bounded accuracy: good enough to
//! tell "looking at the screen" from "looking away", not to measure angles.

use sdk::types::{Landmark, LandmarkSet, PoseEstimate};
use serde::{Deserialize, Serialize};

/// Normalizers below this are treated as degenerate
pub const POSE_EPSILON: f64 = 0.01;

/// Degrees of yaw per unit of nose offset relative to eye width
const YAW_SCALE: f64 = 60.0;

/// Nose position on the forehead-chin span for a neutral head
const NEUTRAL_PITCH_RATIO: f64 = 0.55;
const PITCH_SENSITIVITY: f64 = 2.0;
const PITCH_SCALE: f64 = 45.0;

/// Indices of the anatomical points used for pose and gaze
///
/// Defaults follow the MediaPipe face-mesh topology.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LandmarkScheme {
    pub nose_tip: usize,
    pub chin: usize,
    pub forehead: usize,
    pub left_eye_outer: usize,
    pub right_eye_outer: usize,
    pub left_eye_inner: usize,
    pub right_eye_inner: usize,
}

impl Default for LandmarkScheme {
    fn default() -> Self {
        Self {
            nose_tip: 1,
            chin: 152,
            forehead: 10,
            left_eye_outer: 33,
            right_eye_outer: 263,
            left_eye_inner: 133,
            right_eye_inner: 362,
        }
    }
}

/// Estimate yaw and pitch for one face.
///
/// Returns `None` when the set lacks a required landmark. Degenerate
/// geometry (eyes or face span narrower than [`POSE_EPSILON`]) reports 0.0
/// for the affected angle instead of dividing by a near-zero width.
pub fn estimate_pose(landmarks: &LandmarkSet, scheme: &LandmarkScheme) -> Option<PoseEstimate> {
    let nose = landmarks.get(scheme.nose_tip)?;
    let chin = landmarks.get(scheme.chin)?;
    let forehead = landmarks.get(scheme.forehead)?;
    let left_eye = landmarks.get(scheme.left_eye_outer)?;
    let right_eye = landmarks.get(scheme.right_eye_outer)?;

    let eye_center_x = (left_eye.x + right_eye.x) / 2.0;
    let eye_width = (right_eye.x - left_eye.x).abs();

    if eye_width < POSE_EPSILON {
        return Some(PoseEstimate::new(0.0, 0.0));
    }

    let yaw = (nose.x - eye_center_x) / eye_width * YAW_SCALE;

    let face_height = (chin.y - forehead.y).abs();
    if face_height < POSE_EPSILON {
        return Some(PoseEstimate::new(yaw, 0.0));
    }

    let nose_ratio = (nose.y - forehead.y) / face_height;
    let pitch = (nose_ratio - NEUTRAL_PITCH_RATIO) * PITCH_SENSITIVITY * PITCH_SCALE;

    Some(PoseEstimate::new(yaw, pitch))
}

/// Summed nose-to-eye-centroid deviation, scaled to roughly 0..100.
///
/// The centroid is taken over the four eye corners. Returns `None` when a
/// required landmark is missing.
pub fn centroid_deviation(landmarks: &LandmarkSet, scheme: &LandmarkScheme) -> Option<f64> {
    let nose = landmarks.get(scheme.nose_tip)?;
    let corners: [&Landmark; 4] = [
        landmarks.get(scheme.left_eye_inner)?,
        landmarks.get(scheme.right_eye_inner)?,
        landmarks.get(scheme.left_eye_outer)?,
        landmarks.get(scheme.right_eye_outer)?,
    ];

    let center_x = corners.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let center_y = corners.iter().map(|p| p.y).sum::<f64>() / 4.0;

    Some(((nose.x - center_x).abs() + (nose.y - center_y).abs()) * 100.0)
}

/// Round to one decimal place, as reported on the wire
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a landmark set with the scheme's key points placed explicitly
    pub(crate) fn face(
        nose: (f64, f64),
        forehead_y: f64,
        chin_y: f64,
        left_eye_x: f64,
        right_eye_x: f64,
    ) -> LandmarkSet {
        let scheme = LandmarkScheme::default();
        let mut points = vec![Landmark::new(0.5, 0.5); 468];
        points[scheme.nose_tip] = Landmark::new(nose.0, nose.1);
        points[scheme.forehead] = Landmark::new(0.5, forehead_y);
        points[scheme.chin] = Landmark::new(0.5, chin_y);
        points[scheme.left_eye_outer] = Landmark::new(left_eye_x, 0.4);
        points[scheme.right_eye_outer] = Landmark::new(right_eye_x, 0.4);
        points[scheme.left_eye_inner] = Landmark::new(left_eye_x + 0.05, 0.4);
        points[scheme.right_eye_inner] = Landmark::new(right_eye_x - 0.05, 0.4);
        LandmarkSet::new(points)
    }

    #[test]
    fn test_neutral_face_is_forward() {
        // nose at 55% of the forehead-chin span, centered between the eyes
        let set = face((0.5, 0.2 + 0.55 * 0.6), 0.2, 0.8, 0.4, 0.6);
        let pose = estimate_pose(&set, &LandmarkScheme::default()).unwrap();

        assert!(pose.yaw.abs() < 1e-9);
        assert!(pose.pitch.abs() < 1e-9);
    }

    #[test]
    fn test_yaw_scales_with_nose_offset() {
        // offset 0.05 over an eye width of 0.2 is a quarter, 15 degrees
        let set = face((0.55, 0.53), 0.2, 0.8, 0.4, 0.6);
        let pose = estimate_pose(&set, &LandmarkScheme::default()).unwrap();

        assert!((pose.yaw - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_pitch_looking_down() {
        // nose at 80% of the span: (0.8 - 0.55) * 2 * 45 = 22.5
        let set = face((0.5, 0.2 + 0.8 * 0.6), 0.2, 0.8, 0.4, 0.6);
        let pose = estimate_pose(&set, &LandmarkScheme::default()).unwrap();

        assert!((pose.pitch - 22.5).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_eye_width() {
        let set = face((0.7, 0.5), 0.2, 0.8, 0.5, 0.505);
        let pose = estimate_pose(&set, &LandmarkScheme::default()).unwrap();

        assert_eq!(pose, PoseEstimate::new(0.0, 0.0));
    }

    #[test]
    fn test_degenerate_face_height_keeps_yaw() {
        let set = face((0.55, 0.5), 0.5, 0.505, 0.4, 0.6);
        let pose = estimate_pose(&set, &LandmarkScheme::default()).unwrap();

        assert!((pose.yaw - 15.0).abs() < 1e-9);
        assert_eq!(pose.pitch, 0.0);
    }

    #[test]
    fn test_missing_landmark_yields_none() {
        let set = LandmarkSet::new(vec![Landmark::new(0.5, 0.5); 20]);
        assert!(estimate_pose(&set, &LandmarkScheme::default()).is_none());
        assert!(centroid_deviation(&set, &LandmarkScheme::default()).is_none());
    }

    #[test]
    fn test_centroid_deviation() {
        // corners average to (0.5, 0.4); nose at (0.53, 0.45) deviates 3 + 5
        let set = face((0.53, 0.45), 0.2, 0.8, 0.4, 0.6);
        let deviation = centroid_deviation(&set, &LandmarkScheme::default()).unwrap();

        assert!((deviation - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round1(14.96), 15.0);
        assert_eq!(round1(-3.14), -3.1);
        assert_eq!(round2(11.237), 11.24);
    }
}

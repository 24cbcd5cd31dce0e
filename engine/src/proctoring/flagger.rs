//! Per-frame incident decision
//!
//! Pure functions: face count and gaze reading in, at most one flag out.
//! Face count always wins over gaze, since pose is meaningless unless exactly
//! one face is visible.

use super::geometry::{centroid_deviation, estimate_pose, LandmarkScheme};
use sdk::types::{IncidentFlag, LandmarkSet, PoseEstimate};
use serde::{Deserialize, Serialize};

/// How "looking away" is decided
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GazePolicy {
    /// Thresholds on estimated yaw and pitch, in degrees
    HeadPose {
        #[serde(default = "default_yaw_threshold")]
        yaw_threshold: f64,
        #[serde(default = "default_pitch_up_threshold")]
        pitch_up_threshold: f64,
        #[serde(default = "default_pitch_down_threshold")]
        pitch_down_threshold: f64,
    },
    /// Threshold on summed nose-to-eye-centroid deviation
    CentroidDeviation {
        #[serde(default = "default_max_deviation")]
        max_deviation: f64,
    },
}

fn default_yaw_threshold() -> f64 {
    25.0
}

fn default_pitch_up_threshold() -> f64 {
    15.0
}

fn default_pitch_down_threshold() -> f64 {
    -25.0
}

fn default_max_deviation() -> f64 {
    12.0
}

impl Default for GazePolicy {
    fn default() -> Self {
        GazePolicy::HeadPose {
            yaw_threshold: default_yaw_threshold(),
            pitch_up_threshold: default_pitch_up_threshold(),
            pitch_down_threshold: default_pitch_down_threshold(),
        }
    }
}

/// Gaze measurement for a single face, matching the policy that produced it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GazeReading {
    Pose(PoseEstimate),
    Deviation(f64),
}

impl GazePolicy {
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            GazePolicy::HeadPose {
                yaw_threshold,
                pitch_up_threshold,
                pitch_down_threshold,
            } => {
                if yaw_threshold <= 0.0 {
                    return Err("gaze_policy.yaw_threshold must be positive".to_string());
                }
                if pitch_down_threshold >= pitch_up_threshold {
                    return Err(
                        "gaze_policy.pitch_down_threshold must be below pitch_up_threshold"
                            .to_string(),
                    );
                }
                Ok(())
            }
            GazePolicy::CentroidDeviation { max_deviation } => {
                if max_deviation <= 0.0 {
                    return Err("gaze_policy.max_deviation must be positive".to_string());
                }
                Ok(())
            }
        }
    }

    /// Measure gaze for one face. `None` if a required landmark is missing.
    pub fn read(&self, landmarks: &LandmarkSet, scheme: &LandmarkScheme) -> Option<GazeReading> {
        match self {
            GazePolicy::HeadPose { .. } => estimate_pose(landmarks, scheme).map(GazeReading::Pose),
            GazePolicy::CentroidDeviation { .. } => {
                centroid_deviation(landmarks, scheme).map(GazeReading::Deviation)
            }
        }
    }

    pub fn is_away(&self, reading: &GazeReading) -> bool {
        match (*self, reading) {
            (
                GazePolicy::HeadPose {
                    yaw_threshold,
                    pitch_up_threshold,
                    pitch_down_threshold,
                },
                GazeReading::Pose(pose),
            ) => {
                pose.yaw.abs() > yaw_threshold
                    || pose.pitch > pitch_up_threshold
                    || pose.pitch < pitch_down_threshold
            }
            (GazePolicy::CentroidDeviation { max_deviation }, GazeReading::Deviation(deviation)) => {
                *deviation >= max_deviation
            }
            // A reading from a different policy carries no signal here
            _ => false,
        }
    }
}

/// Decide the flag for one frame.
///
/// Order: no face, then multiple faces, then gaze. A single face whose
/// landmarks could not be read produces no flag.
pub fn flag_for(
    face_count: usize,
    reading: Option<&GazeReading>,
    policy: &GazePolicy,
) -> Option<IncidentFlag> {
    match face_count {
        0 => Some(IncidentFlag::NoFace),
        1 => reading
            .filter(|r| policy.is_away(r))
            .map(|_| IncidentFlag::GazeAway),
        _ => Some(IncidentFlag::MultipleFaces),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pose(yaw: f64, pitch: f64) -> GazeReading {
        GazeReading::Pose(PoseEstimate::new(yaw, pitch))
    }

    #[test]
    fn test_face_count_precedence() {
        let policy = GazePolicy::default();
        let away = pose(80.0, 0.0);

        assert_eq!(flag_for(0, None, &policy), Some(IncidentFlag::NoFace));
        assert_eq!(
            flag_for(2, Some(&away), &policy),
            Some(IncidentFlag::MultipleFaces)
        );
        assert_eq!(flag_for(1, Some(&away), &policy), Some(IncidentFlag::GazeAway));
    }

    #[test]
    fn test_head_pose_thresholds() {
        let policy = GazePolicy::default();

        assert_eq!(flag_for(1, Some(&pose(0.0, 0.0)), &policy), None);
        assert_eq!(flag_for(1, Some(&pose(25.0, 0.0)), &policy), None);
        assert_eq!(
            flag_for(1, Some(&pose(-25.1, 0.0)), &policy),
            Some(IncidentFlag::GazeAway)
        );
        assert_eq!(
            flag_for(1, Some(&pose(0.0, 15.1)), &policy),
            Some(IncidentFlag::GazeAway)
        );
        assert_eq!(flag_for(1, Some(&pose(0.0, -25.0)), &policy), None);
        assert_eq!(
            flag_for(1, Some(&pose(0.0, -25.1)), &policy),
            Some(IncidentFlag::GazeAway)
        );
    }

    #[test]
    fn test_centroid_threshold() {
        let policy = GazePolicy::CentroidDeviation {
            max_deviation: 12.0,
        };

        assert_eq!(
            flag_for(1, Some(&GazeReading::Deviation(11.9)), &policy),
            None
        );
        assert_eq!(
            flag_for(1, Some(&GazeReading::Deviation(12.0)), &policy),
            Some(IncidentFlag::GazeAway)
        );
    }

    #[test]
    fn test_unreadable_single_face_is_not_flagged() {
        assert_eq!(flag_for(1, None, &GazePolicy::default()), None);
    }

    #[test]
    fn test_validate() {
        assert!(GazePolicy::default().validate().is_ok());
        assert!(GazePolicy::HeadPose {
            yaw_threshold: 25.0,
            pitch_up_threshold: -30.0,
            pitch_down_threshold: -25.0,
        }
        .validate()
        .is_err());
        assert!(GazePolicy::CentroidDeviation { max_deviation: 0.0 }
            .validate()
            .is_err());
    }
}

//! Proctoring signal pipeline
//!
//! frame → external landmark detector → gaze reading → incident flag.
//!
//! Frames are never persisted. When a candidate id accompanies the frame and
//! the flag survives the [`IncidentDebouncer`], the incident is handed to
//! [`ExamService::record_incident`] for the candidate's current attempt.

use crate::config::ProctoringConfig;
use crate::exam::ExamService;
use image::GenericImageView;
use sdk::errors::EngineError;
use sdk::types::{FrameAnalysis, IncidentFlag, IncidentRecord, LandmarkSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod debounce;
pub mod detector;
pub mod flagger;
pub mod geometry;

pub use debounce::IncidentDebouncer;
pub use detector::{FaceDetector, HttpLandmarkDetector};
pub use flagger::{flag_for, GazePolicy, GazeReading};
pub use geometry::{centroid_deviation, estimate_pose, LandmarkScheme};

/// A decoded webcam frame. Only dimensions are inspected locally.
#[derive(Debug, Clone)]
pub struct Frame {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
}

impl Frame {
    /// Validate that `bytes` is a readable image and capture its size
    pub fn decode(bytes: Vec<u8>) -> Result<Self, EngineError> {
        if bytes.is_empty() {
            return Err(EngineError::InvalidInput("Empty frame upload".to_string()));
        }

        let image = image::load_from_memory(&bytes)
            .map_err(|e| EngineError::InvalidInput(format!("Unreadable frame: {}", e)))?;
        let (width, height) = image.dimensions();

        Ok(Self {
            bytes,
            width,
            height,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Response of the audio endpoint
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioAnalysis {
    pub message: String,
    pub timestamp: i64,
}

/// Audio analysis is not implemented; uploads are acknowledged and dropped
pub fn analyze_audio(_clip: &[u8]) -> AudioAnalysis {
    AudioAnalysis {
        message: "Audio analysis not yet implemented".to_string(),
        timestamp: now_millis(),
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Turn detector output into a frame verdict. Pure.
///
/// Yaw and pitch are reported to one decimal; the flag is decided on the
/// unrounded values.
pub fn analyze_faces(
    faces: &[LandmarkSet],
    policy: &GazePolicy,
    scheme: &LandmarkScheme,
    timestamp: i64,
) -> FrameAnalysis {
    let reading = match faces {
        [single] => policy.read(single, scheme),
        _ => None,
    };

    let flag = flag_for(faces.len(), reading.as_ref(), policy);

    let (yaw, pitch, deviation) = match reading {
        Some(GazeReading::Pose(pose)) => (
            Some(geometry::round1(pose.yaw)),
            Some(geometry::round1(pose.pitch)),
            None,
        ),
        Some(GazeReading::Deviation(d)) => (None, None, Some(geometry::round2(d))),
        None => (None, None, None),
    };

    FrameAnalysis {
        faces: faces.len(),
        yaw,
        pitch,
        deviation,
        flag,
        timestamp,
    }
}

pub struct ProctorService {
    detector: Option<Arc<dyn FaceDetector>>,
    policy: GazePolicy,
    scheme: LandmarkScheme,
    debouncer: IncidentDebouncer,
    exams: Arc<ExamService>,
}

impl ProctorService {
    pub fn new(
        detector: Option<Arc<dyn FaceDetector>>,
        config: &ProctoringConfig,
        exams: Arc<ExamService>,
    ) -> Self {
        Self {
            detector,
            policy: config.gaze_policy,
            scheme: LandmarkScheme::default(),
            debouncer: IncidentDebouncer::new(Duration::from_millis(config.debounce_window_ms)),
            exams,
        }
    }

    /// Build the HTTP detector from config, if a URL is set
    pub fn detector_from_config(
        config: &ProctoringConfig,
    ) -> Result<Option<Arc<dyn FaceDetector>>, EngineError> {
        match &config.detector_url {
            Some(url) => {
                let detector = HttpLandmarkDetector::new(url.clone(), Duration::from_secs(10))?;
                Ok(Some(Arc::new(detector)))
            }
            None => Ok(None),
        }
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
    }

    /// Analyze one frame, recording an incident for `candidate_id` if flagged
    pub async fn analyze_frame(
        &self,
        candidate_id: Option<&str>,
        frame: &Frame,
    ) -> Result<FrameAnalysis, EngineError> {
        let detector = self.detector.as_ref().ok_or_else(|| {
            EngineError::ServiceUnavailable("No landmark detector configured".to_string())
        })?;

        let faces = detector.detect(frame).await?;
        let analysis = analyze_faces(&faces, &self.policy, &self.scheme, now_millis());

        debug!(
            "Frame analysis: faces={} yaw={:?} pitch={:?} flag={:?}",
            analysis.faces, analysis.yaw, analysis.pitch, analysis.flag
        );

        if let (Some(candidate_id), Some(flag)) = (candidate_id, analysis.flag) {
            let details = match (analysis.yaw, analysis.pitch, analysis.deviation) {
                (Some(yaw), Some(pitch), _) => {
                    format!("faces={} yaw={} pitch={}", analysis.faces, yaw, pitch)
                }
                (_, _, Some(deviation)) => {
                    format!("faces={} deviation={}", analysis.faces, deviation)
                }
                _ => format!("faces={}", analysis.faces),
            };
            self.report_incident(candidate_id, flag, details).await?;
        }

        Ok(analysis)
    }

    /// Record a flag for a candidate unless it is a debounced repeat.
    /// Returns whether a row was written.
    pub async fn report_incident(
        &self,
        candidate_id: &str,
        flag: IncidentFlag,
        details: String,
    ) -> Result<bool, EngineError> {
        if !self.debouncer.should_record(candidate_id, flag).await {
            return Ok(false);
        }

        let incident = IncidentRecord {
            incident_type: flag.as_str().to_string(),
            details,
            question_context: String::new(),
            recorded_at: now_millis(),
        };

        match self.exams.record_incident(candidate_id, incident).await {
            Ok(()) => {
                debug!("Recorded {} incident for {}", flag, candidate_id);
                Ok(true)
            }
            Err(e) => {
                warn!("Failed to record {} for {}: {}", flag, candidate_id, e);
                Err(e)
            }
        }
    }

    /// Clear debounce state once a candidate's exam is over
    pub async fn forget(&self, candidate_id: &str) {
        self.debouncer.forget(candidate_id).await;
    }
}

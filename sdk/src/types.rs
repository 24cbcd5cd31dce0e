//! Shared domain and wire types
//!
//! Proctoring types (landmarks, pose, incident flags), connectivity status,
//! and the answer / grading / summary records that flow between the exam
//! service, the session store, and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Proctoring
// ============================================================================

/// An integrity-relevant event surfaced to the proctoring layer.
///
/// "No incident" is represented as `Option::<IncidentFlag>::None`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IncidentFlag {
    NoFace,
    MultipleFaces,
    GazeAway,
    ConnectivityTimeout,
}

impl IncidentFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentFlag::NoFace => "no_face",
            IncidentFlag::MultipleFaces => "multiple_faces",
            IncidentFlag::GazeAway => "gaze_away",
            IncidentFlag::ConnectivityTimeout => "connectivity_timeout",
        }
    }
}

impl fmt::Display for IncidentFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized facial landmark produced by the external detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

impl Landmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }
}

/// Landmarks of one face, indexed by the detector's fixed anatomical scheme.
///
/// A frame without a face produces no `LandmarkSet` at all, never a partial one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LandmarkSet {
    pub landmarks: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(landmarks: Vec<Landmark>) -> Self {
        Self { landmarks }
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.landmarks.get(index)
    }

    pub fn len(&self) -> usize {
        self.landmarks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.landmarks.is_empty()
    }
}

/// Head rotation estimate in degrees, zero-centered on a forward-facing pose.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct PoseEstimate {
    pub yaw: f64,
    pub pitch: f64,
}

impl PoseEstimate {
    pub fn new(yaw: f64, pitch: f64) -> Self {
        Self { yaw, pitch }
    }
}

/// Result of analyzing one webcam frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameAnalysis {
    pub faces: usize,
    pub yaw: Option<f64>,
    pub pitch: Option<f64>,
    /// Nose-to-eye-centroid deviation, only set by the centroid gaze policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deviation: Option<f64>,
    pub flag: Option<IncidentFlag>,
    /// Epoch milliseconds
    pub timestamp: i64,
}

/// Liveness report for one candidate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionStatus {
    pub connected: bool,
    /// Seconds since the last ping, `None` when the candidate never connected
    pub downtime: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<IncidentFlag>,
}

impl ConnectionStatus {
    pub fn never_connected() -> Self {
        Self {
            connected: false,
            downtime: None,
            flag: None,
        }
    }

    pub fn live() -> Self {
        Self {
            connected: true,
            downtime: Some(0.0),
            flag: None,
        }
    }

    pub fn timed_out(elapsed_secs: f64) -> Self {
        Self {
            connected: false,
            downtime: Some((elapsed_secs * 100.0).round() / 100.0),
            flag: Some(IncidentFlag::ConnectivityTimeout),
        }
    }
}

/// A persisted proctoring incident.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentRecord {
    /// Flag name or a client-side event such as `tab_hidden`
    pub incident_type: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub question_context: String,
    /// Epoch milliseconds
    #[serde(default)]
    pub recorded_at: i64,
}

// ============================================================================
// Answers
// ============================================================================

fn default_exam_set() -> String {
    "A".to_string()
}

/// One exam attempt, identified by candidate id and start timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attempt {
    pub id: String,
    pub candidate_id: String,
    pub exam_set: String,
    /// Epoch milliseconds
    pub started_at: i64,
}

/// Answer as sent by the client. The correct answer is never accepted from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub candidate_id: String,
    #[serde(default = "default_exam_set")]
    pub exam_set: String,
    pub subject: String,
    pub section_id: String,
    pub question_id: String,
    #[serde(default)]
    pub question_number: Option<u32>,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub selected_option: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

/// Stored answer for one (candidate, question) pair within an attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerRecord {
    pub candidate_id: String,
    pub exam_set: String,
    pub subject: String,
    pub section_id: String,
    pub question_id: String,
    pub question_number: Option<u32>,
    pub prompt: String,
    /// Resolved server-side from the question bank
    pub correct_answer: Option<String>,
    pub selected_option: Option<String>,
    /// Free-text or transcribed spoken answer
    pub answer_text: Option<String>,
}

// ============================================================================
// Grading
// ============================================================================

/// Grading strategy tag as stored with each result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GradingType {
    Auto,
    Keyword,
    AiRubric,
}

impl GradingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradingType::Auto => "auto",
            GradingType::Keyword => "keyword",
            GradingType::AiRubric => "ai_rubric",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(GradingType::Auto),
            "keyword" => Some(GradingType::Keyword),
            "ai_rubric" => Some(GradingType::AiRubric),
            _ => None,
        }
    }
}

impl fmt::Display for GradingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-category score from rubric-based AI grading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CategoryScore {
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub level: Option<u32>,
    #[serde(default)]
    pub reason: String,
}

/// Score for one graded question.
///
/// `final_score` is always `auto_score`, else `ai_score`, else 0, clamped to
/// `[0, max_marks]`. Build it with [`GradingResult::new`] to keep that true.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GradingResult {
    pub question_id: String,
    pub section_id: String,
    pub grading_type: GradingType,
    pub max_marks: f64,
    pub auto_score: Option<f64>,
    pub ai_score: Option<f64>,
    pub final_score: f64,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BTreeMap<String, CategoryScore>>,
}

impl GradingResult {
    pub fn new(
        question_id: impl Into<String>,
        section_id: impl Into<String>,
        grading_type: GradingType,
        max_marks: f64,
        auto_score: Option<f64>,
        ai_score: Option<f64>,
        feedback: impl Into<String>,
    ) -> Self {
        let max_marks = max_marks.max(0.0);
        let final_score = auto_score.or(ai_score).unwrap_or(0.0).clamp(0.0, max_marks);
        Self {
            question_id: question_id.into(),
            section_id: section_id.into(),
            grading_type,
            max_marks,
            auto_score,
            ai_score,
            final_score,
            feedback: feedback.into(),
            breakdown: None,
        }
    }

    pub fn with_breakdown(mut self, breakdown: BTreeMap<String, CategoryScore>) -> Self {
        self.breakdown = Some(breakdown);
        self
    }
}

/// Aggregate result for one graded attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub attempt_id: String,
    pub candidate_id: String,
    pub exam_set: String,
    pub total_score: f64,
    pub total_max: f64,
    pub percentage: f64,
    pub graded_at: DateTime<Utc>,
}

/// Summary plus per-question detail, as returned by the results query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExamResults {
    pub summary: SessionSummary,
    pub grading: Vec<GradingResult>,
}

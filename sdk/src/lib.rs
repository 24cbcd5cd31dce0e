//! Proctor SDK
//!
//! Shared library providing the domain types and error handling used by the
//! proctoring engine and anything that talks to it over the wire.

/// Error types and handling
pub mod errors;

/// Proctoring, answer, and grading types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, ErrorExt};
pub use types::{
    AnswerRecord, AnswerSubmission, Attempt, CategoryScore, ConnectionStatus, ExamResults,
    FrameAnalysis, GradingResult, GradingType, IncidentFlag, IncidentRecord, Landmark,
    LandmarkSet, PoseEstimate, SessionSummary,
};

//! Error types and handling
//!
//! This module provides the error types used throughout the proctoring engine.
//! All errors implement the `ErrorExt` trait which provides user-friendly
//! hints and indicates whether errors are recoverable.
//!
//! # Error Categories
//!
//! - **Input validation**: missing candidate ids, malformed uploads. Rejected
//!   before any state is written.
//! - **Collaborator unavailable**: LLM service, landmark detector. Grading never
//!   surfaces these; it degrades to a deterministic fallback instead.
//! - **Missing configuration**: invalid config file or rubric documents.
//! - **Not found**: no stored attempt or summary for a candidate.

use thiserror::Error;

/// Trait for engine error extensions
///
/// Provides a hint that is safe to show to candidates and proctors, and tells
/// callers whether retrying makes sense.
pub trait ErrorExt {
    /// Returns a user-friendly hint for the error
    ///
    /// The hint never contains API keys, file paths, or raw upstream responses.
    fn user_hint(&self) -> &str;

    /// Returns whether the error is recoverable
    fn is_recoverable(&self) -> bool;
}

/// Main engine error type
///
/// # Examples
///
/// ```
/// use sdk::errors::{EngineError, ErrorExt};
///
/// let error = EngineError::NotFound("results for c-17".to_string());
/// println!("Hint: {}", error.user_hint());
/// assert!(error.is_recoverable());
///
/// let fatal = EngineError::Config("bad threshold".to_string());
/// assert!(!fatal.is_recoverable());
/// ```
#[derive(Debug, Error)]
pub enum EngineError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    // Client errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // External collaborators
    #[error("LLM provider error: {0}")]
    LLMProvider(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Rate limit exceeded for {src}: {count}/{limit} calls in {window}")]
    RateLimitExceeded {
        src: String,
        count: usize,
        limit: usize,
        window: String,
    },

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ErrorExt for EngineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::Config(_) => "Check your config.toml and rubric documents for errors",
            Self::Database(_) => "Session storage failed. Try again shortly",
            Self::InvalidInput(_) => "The request was incomplete or malformed",
            Self::NotFound(_) => "No stored exam attempt matches this request",
            Self::LLMProvider(_) => "AI grading is unavailable. Deterministic scores are kept",
            Self::ServiceUnavailable(_) => "A required service is not reachable. Try again",
            Self::RateLimitExceeded { .. } => {
                "Rate limit exceeded. Please wait before trying again"
            }
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

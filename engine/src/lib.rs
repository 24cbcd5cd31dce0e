//! Proctor Engine Library
//!
//! Proctoring signal pipeline (frame → pose → incident flag, heartbeat
//! liveness) and the grading cascade (answer → strategy → score → summary).
//! Used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Telemetry and Observability
pub mod telemetry;

/// Shared store abstractions and per-candidate locks
pub mod store;

/// Database persistence module
pub mod db;

/// Rate limiting module
pub mod rate_limiter;

/// LLM provider abstraction layer
pub mod llm;

/// Frame analysis and incident flagging
pub mod proctoring;

/// Candidate liveness tracking
pub mod heartbeat;

/// Grading cascade and aggregation
pub mod grading;

/// Exam documents and attempt lifecycle
pub mod exam;

/// HTTP and WebSocket transport
pub mod server;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

//! Configuration management
//!
//! This module handles loading, validation, and management of the proctor
//! configuration. Configuration is stored in TOML format at
//! ~/.proctor/config.toml and created with defaults on first run.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory (SQLite session store lives here)
//! - **server**: Bind address and CORS origins
//! - **proctoring**: Gaze policy and thresholds, incident debounce, detector URL
//! - **heartbeat**: Liveness timeout
//! - **grading**: Rubric and question bank locations, answer length guards
//! - **llm**: OpenAI-compatible endpoint, models, key variable, timeout, rate limit
//!
//! # Path Expansion
//!
//! `~` in `data_dir`, `rubrics_dir` and `question_bank_dir` is expanded to the
//! user's home directory. The data directory is created if missing.
//!
//! # Examples
//!
//! ```no_run
//! use proctor_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//!
//! println!("Data dir: {:?}", config.core.data_dir);
//! println!("Heartbeat timeout: {}s", config.heartbeat.timeout_secs);
//! # Ok(())
//! # }
//! ```

use crate::proctoring::GazePolicy;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub core: CoreConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub proctoring: ProctoringConfig,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    #[serde(default)]
    pub grading: GradingConfig,

    #[serde(default)]
    pub llm: LlmConfig,
}

/// Core engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Origins allowed by CORS
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

/// Frame analysis configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProctoringConfig {
    #[serde(default)]
    pub gaze_policy: GazePolicy,

    /// Suppress repeats of the same flag for a candidate within this window.
    /// 0 records every flagged frame.
    #[serde(default)]
    pub debounce_window_ms: u64,

    /// External landmark detection service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detector_url: Option<String>,
}

/// Liveness tracking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_secs: u64,
}

/// Grading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Directory holding `<subject>_set<set>.json` rubric documents
    #[serde(default = "default_rubrics_dir")]
    pub rubrics_dir: PathBuf,

    /// Directory holding `<subject>_exam_<set>.json` question banks
    #[serde(default = "default_question_bank_dir")]
    pub question_bank_dir: PathBuf,

    /// AI keyword fallback only runs for answers strictly longer than this
    #[serde(default = "default_ai_min_answer_chars")]
    pub ai_min_answer_chars: usize,

    /// Spoken answers shorter than this score 0 without calling the model
    #[serde(default = "default_speaking_min_answer_chars")]
    pub speaking_min_answer_chars: usize,

    /// Score ceiling for ai_rubric questions without an explicit max
    #[serde(default = "default_speaking_max")]
    pub speaking_default_max: f64,
}

/// OpenAI-compatible grading service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_keyword_model")]
    pub keyword_model: String,

    #[serde(default = "default_speaking_model")]
    pub speaking_model: String,

    /// Name of the environment variable holding the API key.
    /// The key itself is never written to the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// 0 disables rate limiting
    #[serde(default = "default_max_calls_per_minute")]
    pub max_calls_per_minute: usize,
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key from the configured environment variable, if set and non-empty
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

impl HeartbeatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.proctor")
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:5173".to_string(),
        "http://127.0.0.1:5173".to_string(),
    ]
}

fn default_heartbeat_timeout() -> u64 {
    10
}

fn default_rubrics_dir() -> PathBuf {
    PathBuf::from("~/.proctor/rubrics")
}

fn default_question_bank_dir() -> PathBuf {
    PathBuf::from("~/.proctor/question_banks")
}

fn default_ai_min_answer_chars() -> usize {
    5
}

fn default_speaking_min_answer_chars() -> usize {
    10
}

fn default_speaking_max() -> f64 {
    40.0
}

fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}

fn default_keyword_model() -> String {
    "llama-3.1-8b-instant".to_string()
}

fn default_speaking_model() -> String {
    "llama-3.3-70b-versatile".to_string()
}

fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}

fn default_llm_timeout() -> u64 {
    30
}

fn default_max_calls_per_minute() -> usize {
    30
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_heartbeat_timeout(),
        }
    }
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            rubrics_dir: default_rubrics_dir(),
            question_bank_dir: default_question_bank_dir(),
            ai_min_answer_chars: default_ai_min_answer_chars(),
            speaking_min_answer_chars: default_speaking_min_answer_chars(),
            speaking_default_max: default_speaking_max(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            keyword_model: default_keyword_model(),
            speaking_model: default_speaking_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_llm_timeout(),
            max_calls_per_minute: default_max_calls_per_minute(),
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.proctor/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails (bad thresholds, unknown log level)
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&contents)
    }

    /// Parse, validate and process configuration text
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let mut config: Config = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        // Serialize before processing so the file keeps the portable ~ paths
        let toml_string = toml::to_string_pretty(&Self::default())
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = Self::default();
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.proctor/config.toml)
    fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".proctor").join("config.toml"))
    }

    /// Path of the SQLite session store inside the data directory
    pub fn database_path(&self) -> PathBuf {
        self.core.data_dir.join("proctor.db")
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates the log level
    /// - Validates gaze thresholds and timeouts
    /// - Expands ~ in paths
    /// - Creates the data directory if it doesn't exist
    pub fn validate_and_process(&mut self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        self.proctoring
            .gaze_policy
            .validate()
            .map_err(EngineError::Config)?;

        if self.heartbeat.timeout_secs == 0 {
            return Err(EngineError::Config(
                "heartbeat.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.llm.timeout_secs == 0 {
            return Err(EngineError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.grading.speaking_default_max <= 0.0 {
            return Err(EngineError::Config(
                "grading.speaking_default_max must be positive".to_string(),
            ));
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        self.grading.rubrics_dir = expand_path(&self.grading.rubrics_dir)?;
        self.grading.question_bank_dir = expand_path(&self.grading.question_bank_dir)?;

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                EngineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, EngineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| EngineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

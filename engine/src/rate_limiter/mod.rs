//! Rate limiting module
//!
//! Guards outbound AI grading calls, the main latency and cost driver of a
//! grading pass. Operations are tracked per source (e.g. `"ai-keyword"`,
//! `"ai-speaking"`) in an in-memory sliding window.
//!
//! A rejected call surfaces as [`EngineError::RateLimitExceeded`]; graders
//! treat that like any other collaborator failure and keep the deterministic
//! result.

use sdk::errors::EngineError;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Sliding-window limiter keyed by source
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    operations: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    /// Create a limiter allowing `limit` operations per `window`.
    /// A limit of 0 disables limiting.
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            operations: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: usize) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    pub fn is_enabled(&self) -> bool {
        self.limit > 0
    }

    /// Check the limit and, if allowed, record the operation in one step
    pub async fn acquire(&self, source: &str) -> Result<(), EngineError> {
        self.acquire_at(source, Instant::now()).await
    }

    pub async fn acquire_at(&self, source: &str, now: Instant) -> Result<(), EngineError> {
        if !self.is_enabled() {
            return Ok(());
        }

        let mut operations = self.operations.lock().await;
        let entries = operations.entry(source.to_string()).or_default();
        Self::evict_expired(entries, now, self.window);

        let count = entries.len();
        debug!(
            "Rate limit check for {}: {}/{} in window",
            source, count, self.limit
        );

        if count >= self.limit {
            warn!(
                "Rate limit exceeded for source {}: {}/{}",
                source, count, self.limit
            );
            return Err(EngineError::RateLimitExceeded {
                src: source.to_string(),
                count,
                limit: self.limit,
                window: format_window(self.window),
            });
        }

        entries.push_back(now);
        Ok(())
    }

    /// Number of operations currently counted for a source
    pub async fn current_count(&self, source: &str) -> usize {
        let mut operations = self.operations.lock().await;
        match operations.get_mut(source) {
            Some(entries) => {
                Self::evict_expired(entries, Instant::now(), self.window);
                entries.len()
            }
            None => 0,
        }
    }

    fn evict_expired(entries: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = entries.front() {
            if now.saturating_duration_since(*oldest) >= window {
                entries.pop_front();
            } else {
                break;
            }
        }
    }
}

fn format_window(window: Duration) -> String {
    match window.as_secs() {
        60 => "1 minute".to_string(),
        secs if secs % 60 == 0 => format!("{} minutes", secs / 60),
        secs => format!("{} seconds", secs),
    }
}

//! Incident debouncing
//!
//! Frames arrive every couple of seconds, so a candidate who glances away for
//! a moment can produce a run of identical flags. The debouncer drops repeats
//! of the same (candidate, flag) pair inside a configurable window. A zero
//! window records every flagged frame.

use sdk::types::IncidentFlag;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

pub struct IncidentDebouncer {
    window: Duration,
    last_recorded: Mutex<HashMap<(String, IncidentFlag), Instant>>,
}

impl IncidentDebouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_recorded: Mutex::new(HashMap::new()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Returns true if this flag should be recorded, and marks it as recorded
    pub async fn should_record(&self, candidate_id: &str, flag: IncidentFlag) -> bool {
        self.should_record_at(candidate_id, flag, Instant::now())
            .await
    }

    pub async fn should_record_at(
        &self,
        candidate_id: &str,
        flag: IncidentFlag,
        now: Instant,
    ) -> bool {
        if self.window.is_zero() {
            return true;
        }

        let mut last_recorded = self.last_recorded.lock().await;
        let key = (candidate_id.to_string(), flag);

        if let Some(previous) = last_recorded.get(&key) {
            if now.saturating_duration_since(*previous) < self.window {
                debug!("Suppressing repeated {} for {}", flag, candidate_id);
                return false;
            }
        }

        last_recorded.insert(key, now);
        true
    }

    /// Drop state for a candidate, e.g. after the exam is finished
    pub async fn forget(&self, candidate_id: &str) {
        self.last_recorded
            .lock()
            .await
            .retain(|(candidate, _), _| candidate != candidate_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_window_records_everything() {
        let debouncer = IncidentDebouncer::disabled();
        let now = Instant::now();

        for _ in 0..5 {
            assert!(
                debouncer
                    .should_record_at("c1", IncidentFlag::GazeAway, now)
                    .await
            );
        }
    }

    #[tokio::test]
    async fn test_repeats_suppressed_within_window() {
        let debouncer = IncidentDebouncer::new(Duration::from_secs(5));
        let start = Instant::now();

        assert!(
            debouncer
                .should_record_at("c1", IncidentFlag::GazeAway, start)
                .await
        );
        assert!(
            !debouncer
                .should_record_at("c1", IncidentFlag::GazeAway, start + Duration::from_secs(2))
                .await
        );
        assert!(
            debouncer
                .should_record_at("c1", IncidentFlag::GazeAway, start + Duration::from_secs(5))
                .await
        );
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let debouncer = IncidentDebouncer::new(Duration::from_secs(5));
        let now = Instant::now();

        assert!(debouncer.should_record_at("c1", IncidentFlag::GazeAway, now).await);
        assert!(debouncer.should_record_at("c1", IncidentFlag::NoFace, now).await);
        assert!(debouncer.should_record_at("c2", IncidentFlag::GazeAway, now).await);
    }

    #[tokio::test]
    async fn test_forget_resets_candidate() {
        let debouncer = IncidentDebouncer::new(Duration::from_secs(60));
        let now = Instant::now();

        assert!(debouncer.should_record_at("c1", IncidentFlag::NoFace, now).await);
        debouncer.forget("c1").await;
        assert!(debouncer.should_record_at("c1", IncidentFlag::NoFace, now).await);
    }
}

//! Candidate liveness tracking
//!
//! Per-candidate state machine:
//!
//! ```text
//! unconnected --connect--> connected --ping--> connected
//!                              |
//!                  (no ping for > timeout, seen at query time)
//!                              v
//!                            stale   (reported with connectivity_timeout)
//! ```
//!
//! Staleness is computed lazily when status is queried; there is no
//! background timer. Disconnect removes the entry, so the candidate is then
//! reported as never connected. A new connection for the same candidate
//! replaces the previous one, and the superseded connection can no longer
//! refresh or remove the entry.
//!
//! A stale connection is one timeout episode until the next ping or
//! reconnect. [`HeartbeatTracker::claim_timeout_report`] grants the right to
//! record that episode once.

use crate::store::KvStore;
use sdk::types::ConnectionStatus;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateConnection {
    pub connection_id: Uuid,
    pub connected_at: Instant,
    pub last_ping: Instant,
    /// Set once the current stale episode has been recorded
    pub timeout_reported: bool,
}

pub struct HeartbeatTracker {
    connections: Arc<dyn KvStore<CandidateConnection>>,
    timeout: Duration,
}

impl HeartbeatTracker {
    pub fn new(connections: Arc<dyn KvStore<CandidateConnection>>, timeout: Duration) -> Self {
        Self {
            connections,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Register a new connection, replacing any previous one for the candidate
    pub async fn connect(&self, candidate_id: &str) -> Uuid {
        self.connect_at(candidate_id, Instant::now()).await
    }

    pub async fn connect_at(&self, candidate_id: &str, now: Instant) -> Uuid {
        let connection = CandidateConnection {
            connection_id: Uuid::new_v4(),
            connected_at: now,
            last_ping: now,
            timeout_reported: false,
        };

        if let Some(previous) = self.connections.put(candidate_id, connection).await {
            warn!(
                "Candidate {} reconnected, replacing connection {}",
                candidate_id, previous.connection_id
            );
        } else {
            info!("Candidate {} connected", candidate_id);
        }

        connection.connection_id
    }

    /// Refresh the last-ping time. Returns false if `connection_id` is no
    /// longer the candidate's active connection.
    pub async fn ping(&self, candidate_id: &str, connection_id: Uuid) -> bool {
        self.ping_at(candidate_id, connection_id, Instant::now())
            .await
    }

    pub async fn ping_at(&self, candidate_id: &str, connection_id: Uuid, now: Instant) -> bool {
        let refreshed = self
            .connections
            .update(candidate_id, &move |current: &CandidateConnection| {
                (current.connection_id == connection_id).then_some(CandidateConnection {
                    last_ping: now,
                    timeout_reported: false,
                    ..*current
                })
            })
            .await
            .is_some();

        if refreshed {
            debug!("Ping from {}", candidate_id);
        } else {
            debug!("Ignoring ping from superseded connection of {}", candidate_id);
        }
        refreshed
    }

    /// Remove the candidate's entry if `connection_id` is still the active one
    pub async fn disconnect(&self, candidate_id: &str, connection_id: Uuid) -> bool {
        let removed = self
            .connections
            .delete_if(candidate_id, &move |c: &CandidateConnection| {
                c.connection_id == connection_id
            })
            .await
            .is_some();

        if removed {
            info!("Candidate {} disconnected", candidate_id);
        }
        removed
    }

    pub async fn status(&self, candidate_id: &str) -> ConnectionStatus {
        self.status_at(candidate_id, Instant::now()).await
    }

    pub async fn status_at(&self, candidate_id: &str, now: Instant) -> ConnectionStatus {
        let Some(connection) = self.connections.get(candidate_id).await else {
            return ConnectionStatus::never_connected();
        };

        let elapsed = now.saturating_duration_since(connection.last_ping);
        if elapsed > self.timeout {
            warn!(
                "Candidate {} silent for {:.2}s, reporting connectivity timeout",
                candidate_id,
                elapsed.as_secs_f64()
            );
            ConnectionStatus::timed_out(elapsed.as_secs_f64())
        } else {
            ConnectionStatus::live()
        }
    }

    /// True exactly once per stale episode of the candidate's connection
    pub async fn claim_timeout_report(&self, candidate_id: &str) -> bool {
        self.claim_timeout_report_at(candidate_id, Instant::now())
            .await
    }

    pub async fn claim_timeout_report_at(&self, candidate_id: &str, now: Instant) -> bool {
        let timeout = self.timeout;
        self.connections
            .update(candidate_id, &move |current: &CandidateConnection| {
                let stale = now.saturating_duration_since(current.last_ping) > timeout;
                (stale && !current.timeout_reported).then_some(CandidateConnection {
                    timeout_reported: true,
                    ..*current
                })
            })
            .await
            .is_some()
    }

    /// Candidate ids with a registered connection, stale or not
    pub async fn tracked_candidates(&self) -> Vec<String> {
        self.connections
            .list_prefix("")
            .await
            .into_iter()
            .map(|(candidate_id, _)| candidate_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use sdk::types::IncidentFlag;

    fn tracker() -> HeartbeatTracker {
        HeartbeatTracker::new(Arc::new(MemoryStore::new()), Duration::from_secs(10))
    }

    #[tokio::test]
    async fn test_never_connected() {
        let status = tracker().status("c1").await;
        assert_eq!(status, ConnectionStatus::never_connected());
    }

    #[tokio::test]
    async fn test_timeout_after_silence() {
        let tracker = tracker();
        let t0 = Instant::now();
        let id = tracker.connect_at("c1", t0).await;
        assert!(tracker.ping_at("c1", id, t0).await);

        let live = tracker.status_at("c1", t0 + Duration::from_secs(5)).await;
        assert!(live.connected);
        assert_eq!(live.downtime, Some(0.0));
        assert_eq!(live.flag, None);

        let stale = tracker.status_at("c1", t0 + Duration::from_secs(11)).await;
        assert!(!stale.connected);
        assert_eq!(stale.downtime, Some(11.0));
        assert_eq!(stale.flag, Some(IncidentFlag::ConnectivityTimeout));
    }

    #[tokio::test]
    async fn test_exactly_timeout_is_still_live() {
        let tracker = tracker();
        let t0 = Instant::now();
        tracker.connect_at("c1", t0).await;

        assert!(tracker.status_at("c1", t0 + Duration::from_secs(10)).await.connected);
    }

    #[tokio::test]
    async fn test_ping_refreshes() {
        let tracker = tracker();
        let t0 = Instant::now();
        let id = tracker.connect_at("c1", t0).await;

        tracker.ping_at("c1", id, t0 + Duration::from_secs(8)).await;
        let status = tracker.status_at("c1", t0 + Duration::from_secs(15)).await;
        assert!(status.connected);
    }

    #[tokio::test]
    async fn test_disconnect_removes_entry() {
        let tracker = tracker();
        let id = tracker.connect("c1").await;

        assert!(tracker.disconnect("c1", id).await);
        assert_eq!(tracker.status("c1").await, ConnectionStatus::never_connected());
        assert!(tracker.tracked_candidates().await.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_supersedes_previous_connection() {
        let tracker = tracker();
        let t0 = Instant::now();
        let old = tracker.connect_at("c1", t0).await;
        let new = tracker.connect_at("c1", t0 + Duration::from_secs(1)).await;
        assert_ne!(old, new);

        // Old socket can neither refresh nor tear down the new entry
        assert!(!tracker.ping_at("c1", old, t0 + Duration::from_secs(2)).await);
        assert!(!tracker.disconnect("c1", old).await);
        assert_eq!(tracker.tracked_candidates().await, vec!["c1".to_string()]);

        assert!(tracker.disconnect("c1", new).await);
    }

    #[tokio::test]
    async fn test_timeout_report_claimed_once_per_episode() {
        let tracker = tracker();
        let t0 = Instant::now();
        let id = tracker.connect_at("c1", t0).await;

        // live connections have nothing to report
        assert!(!tracker.claim_timeout_report_at("c1", t0 + Duration::from_secs(5)).await);

        let stale = t0 + Duration::from_secs(11);
        assert!(tracker.claim_timeout_report_at("c1", stale).await);
        assert!(!tracker.claim_timeout_report_at("c1", stale + Duration::from_secs(3)).await);
        assert!(!tracker.status_at("c1", stale).await.connected);

        // a ping ends the episode, the next silence starts a new one
        assert!(tracker.ping_at("c1", id, t0 + Duration::from_secs(20)).await);
        assert!(tracker.claim_timeout_report_at("c1", t0 + Duration::from_secs(31)).await);
    }

    #[tokio::test]
    async fn test_unknown_candidate_has_no_timeout_to_report() {
        assert!(!tracker().claim_timeout_report("ghost").await);
    }
}

//! Storage abstractions
//!
//! Two seams keep shared state out of module-level globals:
//!
//! - [`KvStore`]: small keyed store for live per-candidate state (heartbeat
//!   connections). [`MemoryStore`] is created at process start, handed to the
//!   components that need it, and dropped at shutdown.
//! - [`SessionStore`]: durable attempt data (answers, incidents, grading rows,
//!   summary). Implemented by [`crate::db::SqliteSessionStore`].
//!
//! [`KeyedLocks`] gives strict per-candidate ordering where callers need it.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{AnswerRecord, Attempt, GradingResult, IncidentRecord, SessionSummary};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// Async key-value store with prefix listing
#[async_trait]
pub trait KvStore<V>: Send + Sync
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V>;

    /// Insert or overwrite, returning the previous value
    async fn put(&self, key: &str, value: V) -> Option<V>;

    async fn delete(&self, key: &str) -> Option<V>;

    /// Delete only if the current value satisfies `predicate`. Atomic with
    /// respect to other calls on the same store.
    async fn delete_if(
        &self,
        key: &str,
        predicate: &(dyn for<'a> Fn(&'a V) -> bool + Send + Sync),
    ) -> Option<V>;

    /// Replace the value with `f(current)` when `f` returns `Some`, and
    /// return the new value. Atomic with respect to other calls on the same
    /// store. Missing keys are left missing.
    async fn update(
        &self,
        key: &str,
        f: &(dyn for<'a> Fn(&'a V) -> Option<V> + Send + Sync),
    ) -> Option<V>;

    /// All entries whose key starts with `prefix`, in key order
    async fn list_prefix(&self, prefix: &str) -> Vec<(String, V)>;
}

/// In-memory ordered store
pub struct MemoryStore<V> {
    entries: RwLock<BTreeMap<String, V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
        }
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<V> KvStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &str) -> Option<V> {
        self.entries.read().await.get(key).cloned()
    }

    async fn put(&self, key: &str, value: V) -> Option<V> {
        self.entries.write().await.insert(key.to_string(), value)
    }

    async fn delete(&self, key: &str) -> Option<V> {
        self.entries.write().await.remove(key)
    }

    async fn delete_if(
        &self,
        key: &str,
        predicate: &(dyn for<'a> Fn(&'a V) -> bool + Send + Sync),
    ) -> Option<V> {
        let mut entries = self.entries.write().await;
        match entries.get(key) {
            Some(value) if predicate(value) => entries.remove(key),
            _ => None,
        }
    }

    async fn update(
        &self,
        key: &str,
        f: &(dyn for<'a> Fn(&'a V) -> Option<V> + Send + Sync),
    ) -> Option<V> {
        let mut entries = self.entries.write().await;
        let next = f(entries.get(key)?)?;
        entries.insert(key.to_string(), next.clone());
        Some(next)
    }

    async fn list_prefix(&self, prefix: &str) -> Vec<(String, V)> {
        self.entries
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// One async mutex per key
///
/// Different keys never contend. Guards are owned so they can be held across
/// await points inside service methods.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop idle entries so the map tracks only active candidates
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(key.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of keys currently tracked
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Durable storage for exam attempts
///
/// An attempt owns one answer collection, its incidents and, once graded,
/// one set of grading rows plus a summary.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a new attempt with id `<candidate_id>_<timestamp>`
    async fn start_attempt(&self, candidate_id: &str, exam_set: &str)
        -> Result<Attempt, EngineError>;

    /// Most recently started attempt for a candidate
    async fn latest_attempt(&self, candidate_id: &str) -> Result<Option<Attempt>, EngineError>;

    /// Set the attempt's exam set, but only while it has no answers.
    /// Returns whether the attempt was changed.
    async fn claim_exam_set(&self, attempt_id: &str, exam_set: &str)
        -> Result<bool, EngineError>;

    /// Store an answer, replacing any earlier answer to the same question
    async fn save_answer(&self, attempt_id: &str, answer: &AnswerRecord)
        -> Result<(), EngineError>;

    async fn list_answers(&self, attempt_id: &str) -> Result<Vec<AnswerRecord>, EngineError>;

    async fn record_incident(
        &self,
        attempt_id: &str,
        incident: &IncidentRecord,
    ) -> Result<(), EngineError>;

    async fn list_incidents(&self, attempt_id: &str) -> Result<Vec<IncidentRecord>, EngineError>;

    /// Persist grading rows and summary together, replacing earlier grading
    async fn save_grading(
        &self,
        attempt_id: &str,
        results: &[GradingResult],
        summary: &SessionSummary,
    ) -> Result<(), EngineError>;

    async fn load_summary(&self, attempt_id: &str) -> Result<Option<SessionSummary>, EngineError>;

    async fn load_grading(&self, attempt_id: &str) -> Result<Vec<GradingResult>, EngineError>;
}

/// Latest attempt for a candidate, starting one if none exists yet
pub async fn current_or_new_attempt(
    store: &dyn SessionStore,
    candidate_id: &str,
    exam_set: &str,
) -> Result<Attempt, EngineError> {
    match store.latest_attempt(candidate_id).await? {
        Some(attempt) => Ok(attempt),
        None => store.start_attempt(candidate_id, exam_set).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_put_get_delete() {
        let store: MemoryStore<u32> = MemoryStore::new();

        assert_eq!(store.put("c1", 1).await, None);
        assert_eq!(store.put("c1", 2).await, Some(1));
        assert_eq!(store.get("c1").await, Some(2));
        assert_eq!(store.delete("c1").await, Some(2));
        assert_eq!(store.get("c1").await, None);
    }

    #[tokio::test]
    async fn test_memory_store_delete_if() {
        let store: MemoryStore<u32> = MemoryStore::new();
        store.put("c1", 7).await;

        assert_eq!(store.delete_if("c1", &|v| *v == 8).await, None);
        assert_eq!(store.get("c1").await, Some(7));
        assert_eq!(store.delete_if("c1", &|v| *v == 7).await, Some(7));
        assert_eq!(store.get("c1").await, None);
    }

    #[tokio::test]
    async fn test_delete_if_through_trait_object() {
        let store: Arc<dyn KvStore<(u32, String)>> = Arc::new(MemoryStore::new());
        store.put("c1", (7, "first".to_string())).await;

        let wanted = 7;
        let removed = store
            .delete_if("c1", &move |v: &(u32, String)| v.0 == wanted)
            .await;
        assert_eq!(removed, Some((7, "first".to_string())));
        assert!(store.list_prefix("").await.is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_update() {
        let store: MemoryStore<u32> = MemoryStore::new();

        assert_eq!(store.update("c1", &|v: &u32| Some(v + 1)).await, None);
        assert_eq!(store.get("c1").await, None);

        store.put("c1", 1).await;
        assert_eq!(store.update("c1", &|v: &u32| Some(v + 1)).await, Some(2));
        assert_eq!(store.update("c1", &|v: &u32| (*v > 5).then_some(0)).await, None);
        assert_eq!(store.get("c1").await, Some(2));
    }

    #[tokio::test]
    async fn test_memory_store_list_prefix() {
        let store: MemoryStore<&'static str> = MemoryStore::new();
        store.put("exam:a:1", "x").await;
        store.put("exam:a:2", "y").await;
        store.put("exam:b:1", "z").await;

        let listed = store.list_prefix("exam:a:").await;
        assert_eq!(
            listed,
            vec![
                ("exam:a:1".to_string(), "x"),
                ("exam:a:2".to_string(), "y")
            ]
        );
        assert!(store.list_prefix("nothing").await.is_empty());
    }

    #[tokio::test]
    async fn test_keyed_locks_serialize_same_key() {
        let locks = Arc::new(KeyedLocks::new());
        let counter = Arc::new(Mutex::new(Vec::new()));

        let guard = locks.lock("c1").await;

        let locks2 = Arc::clone(&locks);
        let counter2 = Arc::clone(&counter);
        let waiter = tokio::spawn(async move {
            let _g = locks2.lock("c1").await;
            counter2.lock().await.push("second");
        });

        tokio::task::yield_now().await;
        counter.lock().await.push("first");
        drop(guard);

        waiter.await.unwrap();
        assert_eq!(*counter.lock().await, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_keyed_locks_different_keys_do_not_block() {
        let locks = KeyedLocks::new();
        let _a = locks.lock("c1").await;
        let b = tokio::time::timeout(std::time::Duration::from_millis(100), locks.lock("c2")).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn test_keyed_locks_prune_idle() {
        let locks = KeyedLocks::new();
        drop(locks.lock("c1").await);
        drop(locks.lock("c2").await);
        // c1 was idle when c2 locked
        assert_eq!(locks.len().await, 1);
    }
}

//! Session-keyed store for scored result sets.
//!
//! Each session holds the result of its most recent successful submission;
//! a newer submission replaces the older one wholesale. Readers get an
//! `Arc` to a complete result set, never a partially written one. Sessions
//! are evicted oldest-first once `capacity` is exceeded.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::detect::ScoredBatch;

/// Session used when a caller does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// A stored result set and where it came from.
#[derive(Debug, Clone)]
pub struct StoredResult {
    pub submission_id: Uuid,
    pub stored_at: DateTime<Utc>,
    pub batch: Arc<ScoredBatch>,
}

#[derive(Debug, Default)]
struct Slots {
    entries: HashMap<String, StoredResult>,
    /// Session keys, least recently written first.
    order: VecDeque<String>,
}

#[derive(Debug, Clone)]
pub struct ResultStore {
    inner: Arc<RwLock<Slots>>,
    capacity: usize,
}

impl ResultStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Slots::default())),
            capacity: capacity.max(1),
        }
    }

    /// Replace `session`'s result set and return the new submission ID.
    pub async fn put(&self, session: &str, batch: ScoredBatch) -> Uuid {
        let submission_id = Uuid::new_v4();
        let entry = StoredResult {
            submission_id,
            stored_at: Utc::now(),
            batch: Arc::new(batch),
        };

        let mut slots = self.inner.write().await;
        slots.order.retain(|s| s.as_str() != session);
        slots.order.push_back(session.to_string());
        slots.entries.insert(session.to_string(), entry);

        while slots.order.len() > self.capacity {
            if let Some(evicted) = slots.order.pop_front() {
                slots.entries.remove(&evicted);
                tracing::debug!(session = %evicted, "evicted result set");
            }
        }

        submission_id
    }

    pub async fn get(&self, session: &str) -> Option<StoredResult> {
        self.inner.read().await.entries.get(session).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Normalise a caller-supplied session key.
///
/// Blank keys fall back to [`DEFAULT_SESSION`].
pub fn session_key(requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(key) if !key.is_empty() => key.to_string(),
        _ => DEFAULT_SESSION.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(tag: &str) -> ScoredBatch {
        ScoredBatch {
            input_headers: vec![tag.to_string()],
            rows: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_empty_store_has_nothing() {
        let store = ResultStore::new(4);
        assert!(store.get(DEFAULT_SESSION).await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_last_writer_wins_per_session() {
        let store = ResultStore::new(4);
        let first = store.put("s1", batch("one")).await;
        let second = store.put("s1", batch("two")).await;
        assert_ne!(first, second);

        let got = store.get("s1").await.unwrap();
        assert_eq!(got.submission_id, second);
        assert_eq!(got.batch.input_headers[0], "two");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = ResultStore::new(4);
        store.put("a", batch("for-a")).await;
        store.put("b", batch("for-b")).await;
        assert_eq!(store.get("a").await.unwrap().batch.input_headers[0], "for-a");
        assert_eq!(store.get("b").await.unwrap().batch.input_headers[0], "for-b");
    }

    #[tokio::test]
    async fn test_oldest_session_evicted() {
        let store = ResultStore::new(2);
        store.put("a", batch("a")).await;
        store.put("b", batch("b")).await;
        // Rewriting "a" makes "b" the oldest.
        store.put("a", batch("a2")).await;
        store.put("c", batch("c")).await;

        assert!(store.get("b").await.is_none());
        assert!(store.get("a").await.is_some());
        assert!(store.get("c").await.is_some());
        assert_eq!(store.len().await, 2);
    }

    #[test]
    fn test_session_key() {
        assert_eq!(session_key(None), DEFAULT_SESSION);
        assert_eq!(session_key(Some("  ")), DEFAULT_SESSION);
        assert_eq!(session_key(Some(" abc ")), "abc");
    }
}

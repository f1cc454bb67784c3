//! In-memory implementation of the ConversationStateStore interface
//!
//! This crate provides an in-memory conversation state store with real
//! per-key expiry, primarily used for development and testing. Expired
//! entries are invisible to readers immediately and reclaimed by a
//! background cleanup task.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;
use tracing::{debug, info};

use chatflow_core::{ConversationStateStore, EngineError};

/// A value with its expiration time
struct ValueWithExpiry {
    /// The stored JSON value
    value: Value,
    /// When the entry stops existing
    expires_at: SystemTime,
}

impl ValueWithExpiry {
    fn expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// In-memory implementation of [`ConversationStateStore`]
pub struct InMemoryStateStore {
    entries: Arc<RwLock<HashMap<String, ValueWithExpiry>>>,
}

impl InMemoryStateStore {
    /// Create a new in-memory store with a background cleanup sweep
    pub fn new() -> Self {
        info!("Creating new InMemoryStateStore");
        let entries = Arc::new(RwLock::new(HashMap::new()));
        Self::start_cleanup_task(entries.clone(), Duration::from_secs(60));
        Self { entries }
    }

    /// Create a store whose cleanup sweep runs at the given interval.
    /// Useful for tests exercising reclamation directly.
    pub fn with_cleanup_interval(interval: Duration) -> Self {
        let entries = Arc::new(RwLock::new(HashMap::new()));
        Self::start_cleanup_task(entries.clone(), interval);
        Self { entries }
    }

    /// Number of live (unexpired) entries
    pub async fn len(&self) -> usize {
        let now = SystemTime::now();
        let entries = self.entries.read().await;
        entries.values().filter(|v| !v.expired(now)).count()
    }

    /// Whether the store holds no live entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Reclaim expired entries in the background
    fn start_cleanup_task(
        entries: Arc<RwLock<HashMap<String, ValueWithExpiry>>>,
        interval: Duration,
    ) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                let now = SystemTime::now();
                let expired_keys: Vec<String> = {
                    let read = entries.read().await;
                    read.iter()
                        .filter(|(_, value)| value.expired(now))
                        .map(|(key, _)| key.clone())
                        .collect()
                };

                if !expired_keys.is_empty() {
                    let mut write = entries.write().await;
                    for key in expired_keys {
                        // Re-check under the write lock; the entry may have
                        // been refreshed between the two lock acquisitions.
                        if write.get(&key).map_or(false, |v| v.expired(now)) {
                            write.remove(&key);
                            debug!(key = %key, "Removed expired state entry");
                        }
                    }
                }
            }
        });
    }
}

impl Default for InMemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStateStore for InMemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, EngineError> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if entry.expired(SystemTime::now()) => Ok(None),
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<(), EngineError> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            ValueWithExpiry {
                value,
                expires_at: SystemTime::now() + ttl,
            },
        );
        debug!(key = %key, ttl_secs = ttl.as_secs_f64(), "Set state entry");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), EngineError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        debug!(key = %key, "Deleted state entry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryStateStore::new();

        store
            .set("p1:u1:position", json!("node-3"), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get("p1:u1:position").await.unwrap(),
            Some(json!("node-3"))
        );

        store.delete("p1:u1:position").await.unwrap();
        assert_eq!(store.get("p1:u1:position").await.unwrap(), None);

        // Deleting an absent key is not an error
        store.delete("p1:u1:position").await.unwrap();
    }

    #[tokio::test]
    async fn test_expired_entry_is_invisible() {
        let store = InMemoryStateStore::new();

        store
            .set("p1:u1:retries", json!(2), Duration::from_millis(20))
            .await
            .unwrap();
        assert_eq!(store.get("p1:u1:retries").await.unwrap(), Some(json!(2)));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.get("p1:u1:retries").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_ttl() {
        let store = InMemoryStateStore::new();

        store
            .set("p1:u1:position", json!("a"), Duration::from_millis(30))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Refresh with a longer TTL before the first one elapses
        store
            .set("p1:u1:position", json!("b"), Duration::from_millis(100))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(
            store.get("p1:u1:position").await.unwrap(),
            Some(json!("b"))
        );
    }

    #[tokio::test]
    async fn test_cleanup_task_reclaims_entries() {
        let store = InMemoryStateStore::with_cleanup_interval(Duration::from_millis(20));

        store
            .set("p1:u1:var:email", json!("a@b.com"), Duration::from_millis(10))
            .await
            .unwrap();
        store
            .set("p1:u1:var:name", json!("Ada"), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        // Only the unexpired entry survives the sweep
        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.get("p1:u1:var:name").await.unwrap(),
            Some(json!("Ada"))
        );
    }

    #[tokio::test]
    async fn test_independent_field_expiry() {
        let store = InMemoryStateStore::new();

        // Session fields expire independently of one another
        store
            .set("p1:u1:position", json!("q"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("p1:u1:question_pending", json!(true), Duration::from_millis(20))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(
            store.get("p1:u1:position").await.unwrap(),
            Some(json!("q"))
        );
        assert_eq!(store.get("p1:u1:question_pending").await.unwrap(), None);
    }
}

//! # Key-Value Store
//!
//! The storage seam used by the read cache and the write queue.
//!
//! ## Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     dyn KeyValueStore                                   │
//! │                                                                         │
//! │   ┌──────────────────────────┐      ┌──────────────────────────┐       │
//! │   │     SqliteKvStore        │      │      MemoryKvStore       │       │
//! │   │  (repository/kv.rs)      │      │      (this file)         │       │
//! │   │                          │      │                          │       │
//! │   │  kv_store table          │      │  BTreeMap behind RwLock  │       │
//! │   │  survives restarts       │      │  set_unavailable(true)   │       │
//! │   │                          │      │  to simulate failures    │       │
//! │   └──────────────────────────┘      └──────────────────────────┘       │
//! │                                                                         │
//! │   Values are opaque strings. get_json / set_json add serde on top.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::error::{DbError, DbResult};

// =============================================================================
// Trait
// =============================================================================

/// Durable string-keyed storage.
///
/// Operations on a single key are atomic. There are no multi-key
/// transactions; callers that need ordering serialize access themselves.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads a value. `Ok(None)` means the key is absent.
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &str, value: &str) -> DbResult<()>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn remove(&self, key: &str) -> DbResult<()>;

    /// Lists keys starting with `prefix`, sorted.
    async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>>;
}

// =============================================================================
// Typed Helpers
// =============================================================================

/// Reads and decodes a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> DbResult<Option<T>> {
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| DbError::serialization(key, e)),
        None => Ok(None),
    }
}

/// Encodes and writes a JSON value.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> DbResult<()> {
    let raw = serde_json::to_string(value).map_err(|e| DbError::serialization(key, e))?;
    store.set(key, &raw).await
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// Process-local store for tests and for running without a database file.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
    unavailable: AtomicBool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail with [`DbError::Unavailable`]
    /// until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored keys.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check(&self) -> DbResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("memory store switched off".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        self.check()?;
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        self.check()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        self.check()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        self.check()?;
        Ok(self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryKvStore::new();

        assert_eq!(store.get("a").await.unwrap(), None);
        store.set("a", "1").await.unwrap();
        store.set("a", "2").await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some("2".to_string()));

        store.remove("a").await.unwrap();
        store.remove("a").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_prefix_scan_is_sorted() {
        let store = MemoryKvStore::new();
        store.set("api_cache:/b", "{}").await.unwrap();
        store.set("api_cache:/a", "{}").await.unwrap();
        store.set("write_queue", "[]").await.unwrap();

        let keys = store.keys_with_prefix("api_cache:").await.unwrap();
        assert_eq!(keys, vec!["api_cache:/a", "api_cache:/b"]);
    }

    #[tokio::test]
    async fn test_unavailable_switch() {
        let store = MemoryKvStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.set("k", "v").await, Err(DbError::Unavailable(_))));
        assert!(store.get("k").await.is_err());

        store.set_unavailable(false);
        store.set("k", "v").await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryKvStore::new();
        set_json(&store, "nums", &vec![1, 2, 3]).await.unwrap();

        let nums: Option<Vec<i32>> = get_json(&store, "nums").await.unwrap();
        assert_eq!(nums, Some(vec![1, 2, 3]));

        store.set("bad", "not json").await.unwrap();
        let bad: DbResult<Option<Vec<i32>>> = get_json(&store, "bad").await;
        assert!(matches!(bad, Err(DbError::Serialization { .. })));
    }
}

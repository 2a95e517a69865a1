//! # Response Cache
//!
//! Last good response per read endpoint, kept across restarts.
//!
//! ```text
//!   live GET /products ── ok ──► put("/products", payload)
//!                                   │
//!                                   ▼
//!   kv_store["api_cache:/products"] = { key, payload, storedAt }
//!                                   │
//!   offline GET /products ──────────┘  get("/products") → payload
//! ```
//!
//! The cache is advisory. A failed write is logged and dropped; a failed or
//! undecodable read is a miss. Neither ever reaches the caller as an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use titan_db::{get_json, set_json, KeyValueStore};

/// Prefix for every cache key in the store.
pub const CACHE_KEY_PREFIX: &str = "api_cache:";

/// Derives the storage key for an endpoint (query string included).
pub fn cache_key(endpoint: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, endpoint)
}

/// One cached response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub payload: Value,
    pub stored_at: DateTime<Utc>,
}

/// Read-through cache over a [`KeyValueStore`].
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn KeyValueStore>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        ResponseCache { store }
    }

    /// Stores the payload for an endpoint, replacing any previous entry.
    pub async fn put(&self, endpoint: &str, payload: &Value) {
        let key = cache_key(endpoint);
        let entry = CacheEntry {
            key: key.clone(),
            payload: payload.clone(),
            stored_at: Utc::now(),
        };

        match set_json(self.store.as_ref(), &key, &entry).await {
            Ok(()) => debug!(key = %key, "Cached response"),
            Err(e) => warn!(key = %key, error = %e, "Failed to persist cache entry"),
        }
    }

    /// Cached payload for an endpoint.
    pub async fn get(&self, endpoint: &str) -> Option<Value> {
        self.entry(endpoint).await.map(|entry| entry.payload)
    }

    /// Full cache entry including when it was stored.
    pub async fn entry(&self, endpoint: &str) -> Option<CacheEntry> {
        let key = cache_key(endpoint);
        match get_json::<CacheEntry>(self.store.as_ref(), &key).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Removes every cached response. Returns how many were removed.
    pub async fn clear(&self) -> usize {
        let keys = match self.store.keys_with_prefix(CACHE_KEY_PREFIX).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "Failed to list cache keys");
                return 0;
            }
        };

        let mut removed = 0;
        for key in keys {
            match self.store.remove(&key).await {
                Ok(()) => removed += 1,
                Err(e) => warn!(key = %key, error = %e, "Failed to remove cache entry"),
            }
        }
        removed
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

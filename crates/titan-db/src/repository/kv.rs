//! # SQLite Key-Value Repository
//!
//! `KeyValueStore` over the `kv_store` table.
//!
//! ## Table
//! ```text
//! kv_store
//! ┌──────────────────────────┬──────────────────────────┬──────────────────┐
//! │ key (PK)                 │ value (JSON text)        │ updated_at       │
//! ├──────────────────────────┼──────────────────────────┼──────────────────┤
//! │ api_cache:/products      │ {"payload":..,"stored..} │ 2026-10-17T08:.. │
//! │ write_queue              │ [{"id":..,"endpoint"..}] │ 2026-10-17T08:.. │
//! └──────────────────────────┴──────────────────────────┴──────────────────┘
//! ```
//!
//! Writes are a single upsert, so a crash mid-write leaves either the old or
//! the new value, never a mix.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::store::KeyValueStore;

/// SQLite-backed key-value store.
#[derive(Debug, Clone)]
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    /// Creates a new store over an open pool.
    pub fn new(pool: SqlitePool) -> Self {
        SqliteKvStore { pool }
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv_store WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, bytes = value.len(), "Writing kv entry");

        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn remove(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> DbResult<Vec<String>> {
        // substr comparison avoids LIKE wildcards inside endpoint paths
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT key FROM kv_store WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
        )
        .bind(prefix)
        .fetch_all(&self.pool)
        .await?;

        Ok(keys)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

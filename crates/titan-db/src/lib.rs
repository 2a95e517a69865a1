//! # titan-db: Durable Key-Value Storage for Titan POS
//!
//! The client keeps two things across restarts: the last good response of
//! every read endpoint and the queue of writes made while offline. Both are
//! JSON values under string keys, so this crate exposes exactly that.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Titan POS Client Storage                         │
//! │                                                                         │
//! │  titan-sync: ResponseCache ("api_cache:<endpoint>")                    │
//! │              WriteQueue    ("write_queue")                              │
//! │       │                                                                 │
//! │       ▼  Arc<dyn KeyValueStore>                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     titan-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │ SqliteKvStore │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ (repository/) │    │  (embedded)  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  │   MemoryKvStore (store.rs) ── same trait, no disk              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file under the platform data dir                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use titan_db::{Database, DbConfig, KeyValueStore};
//!
//! let db = Database::new(DbConfig::new("client.db")).await?;
//! let store: Arc<dyn KeyValueStore> = Arc::new(db.kv());
//! store.set("write_queue", "[]").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::kv::SqliteKvStore;
pub use store::{get_json, set_json, KeyValueStore, MemoryKvStore};

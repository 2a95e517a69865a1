//! # Repository Implementations
//!
//! SQL-backed implementations of the storage traits.
//!
//! - [`kv`] - `KeyValueStore` over the `kv_store` table

pub mod kv;

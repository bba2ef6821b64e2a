//! Persistent cache for slice data and manager metadata.
//!
//! This module provides:
//! - A namespaced key/value store backed by SQLite that survives restarts
//! - A centralized key table so the two domains can never collide
//! - Forgiving reads: a corrupt or missing entry is a cache miss, never an error

mod entry;
mod keys;
mod storage;
mod store;

pub use entry::CacheEntry;
pub use keys::{refresh_key, CacheKey, Resource};
pub use storage::{CacheStorage, NoopStorage, SqliteStorage};
pub use store::CacheStore;

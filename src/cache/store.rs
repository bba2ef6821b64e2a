use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use super::keys::CacheKey;
use super::storage::{CacheStorage, NoopStorage};
use crate::domain::Domain;

/// Typed facade over a [`CacheStorage`] backend, shared by every slice.
///
/// Reads never fail: a storage error or an entry that no longer deserializes
/// is logged and treated as a miss. Writes are fire-and-forget: failures are
/// logged and never reach the caller.
#[derive(Clone)]
pub struct CacheStore {
  storage: Arc<dyn CacheStorage>,
}

impl CacheStore {
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Store that never retains anything.
  pub fn disabled() -> Self {
    Self::new(NoopStorage)
  }

  pub fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
    let raw = match self.storage.get_raw(&key.cache_hash()) {
      Ok(Some(raw)) => raw,
      Ok(None) => {
        debug!(key = %key, "cache miss");
        return None;
      }
      Err(e) => {
        warn!(key = %key, error = %e, "cache read failed, treating as miss");
        return None;
      }
    };

    match serde_json::from_slice(&raw) {
      Ok(value) => {
        debug!(key = %key, "cache hit");
        Some(value)
      }
      Err(e) => {
        warn!(key = %key, error = %e, "discarding corrupt cache entry");
        self.clear(key);
        None
      }
    }
  }

  pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T) {
    let data = match serde_json::to_vec(value) {
      Ok(data) => data,
      Err(e) => {
        warn!(key = %key, error = %e, "failed to serialize cache entry");
        return;
      }
    };

    let hash = key.cache_hash();
    if let Err(e) = self
      .storage
      .put_raw(&hash, key.namespace(), &key.description(), &data)
    {
      warn!(key = %key, error = %e, "cache write failed");
    }
  }

  pub fn clear(&self, key: &CacheKey) {
    if let Err(e) = self.storage.delete(&key.cache_hash()) {
      warn!(key = %key, error = %e, "cache eviction failed");
    }
  }

  /// Drop everything persisted for a domain.
  pub fn clear_domain(&self, domain: Domain) {
    match self.storage.delete_namespace(domain.as_str()) {
      Ok(count) => debug!(%domain, count, "cleared cache namespace"),
      Err(e) => warn!(%domain, error = %e, "failed to clear cache namespace"),
    }
  }
}

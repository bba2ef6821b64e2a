use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted value together with the moment it was fetched.
///
/// Both fields are always written in one record, so a reader never sees a
/// timestamp without its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub value: T,
  pub fetched_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  pub fn new(value: T, fetched_at: DateTime<Utc>) -> Self {
    Self { value, fetched_at }
  }
}

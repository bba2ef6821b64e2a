//! Per-resource state with write-through persistence.
//!
//! A [`Slice`] owns exactly one resource's data and status. It never fetches
//! anything itself; the owning manager hands it results through
//! [`Slice::set_data`] and [`Slice::set_error`]. The state transitions are
//! plain functions on [`SliceState`], so they can be exercised without a store.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::cache::{CacheEntry, CacheKey, CacheStore};

/// Lifecycle of a fetchable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
  /// Nothing requested yet
  #[default]
  Idle,
  /// A fetch is outstanding
  Loading,
  /// Last fetch (or cache hydration) produced data
  Success,
  /// Last fetch failed; any previous data is kept
  Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliceState<T> {
  pub data: Option<T>,
  pub status: Status,
  pub error: Option<String>,
  pub last_fetched: Option<DateTime<Utc>>,
}

impl<T> Default for SliceState<T> {
  fn default() -> Self {
    Self {
      data: None,
      status: Status::Idle,
      error: None,
      last_fetched: None,
    }
  }
}

impl<T> SliceState<T> {
  pub fn is_loading(&self) -> bool {
    self.status == Status::Loading
  }

  pub fn is_success(&self) -> bool {
    self.status == Status::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == Status::Error
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  /// Fresh data arrived.
  pub fn with_data(self, value: T, fetched_at: DateTime<Utc>) -> Self {
    Self {
      data: Some(value),
      status: Status::Success,
      error: None,
      last_fetched: Some(fetched_at),
    }
  }

  /// A fetch started. Existing data stays visible.
  pub fn loading(self) -> Self {
    Self {
      status: Status::Loading,
      ..self
    }
  }

  /// A fetch failed. Existing data and its timestamp stay untouched.
  pub fn failed(self, message: impl Into<String>) -> Self {
    Self {
      status: Status::Error,
      error: Some(message.into()),
      ..self
    }
  }

  /// Restore a persisted entry without touching the network.
  pub fn hydrated(self, entry: CacheEntry<T>) -> Self {
    Self {
      data: Some(entry.value),
      status: Status::Success,
      error: None,
      last_fetched: Some(entry.fetched_at),
    }
  }
}

/// One resource's state plus its persisted copy.
pub struct Slice<T> {
  key: CacheKey,
  store: CacheStore,
  state: SliceState<T>,
}

impl<T> Slice<T>
where
  T: Clone + Serialize + DeserializeOwned,
{
  pub fn new(key: CacheKey, store: CacheStore) -> Self {
    Self {
      key,
      store,
      state: SliceState::default(),
    }
  }

  pub fn key(&self) -> &CacheKey {
    &self.key
  }

  pub fn state(&self) -> &SliceState<T> {
    &self.state
  }

  pub fn snapshot(&self) -> SliceState<T> {
    self.state.clone()
  }

  /// Commit a fetched value and write it through to the store.
  pub fn set_data(&mut self, value: T, now: DateTime<Utc>) {
    self.store.set(&self.key, &CacheEntry::new(&value, now));
    self.update(|state| state.with_data(value, now));
  }

  pub fn set_loading(&mut self) {
    self.update(SliceState::loading);
  }

  pub fn set_error(&mut self, message: &str) {
    self.update(|state| state.failed(message));
  }

  /// Back to the empty state, persisted copy included.
  pub fn clear(&mut self) {
    self.state = SliceState::default();
    self.store.clear(&self.key);
  }

  /// Hydrate from the persisted entry if nothing is loaded yet.
  ///
  /// Returns whether the slice now holds data.
  pub fn initialize_from_cache(&mut self) -> bool {
    if self.state.data.is_some() {
      return true;
    }
    match self.store.get::<CacheEntry<T>>(&self.key) {
      Some(entry) => {
        self.update(|state| state.hydrated(entry));
        true
      }
      None => false,
    }
  }

  fn update(&mut self, f: impl FnOnce(SliceState<T>) -> SliceState<T>) {
    let state = std::mem::take(&mut self.state);
    self.state = f(state);
  }
}

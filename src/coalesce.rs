//! Request coalescing: at most one in-flight fetch per resource key.
//!
//! Callers that arrive while a fetch for the same key is outstanding join it
//! and observe its result, success or failure. The registration is removed as
//! soon as the fetch settles, before any caller sees the outcome, so a failed
//! fetch can never leave a key stuck "in flight". The registry only holds a
//! weak handle: once every caller has given up on a fetch it is dropped and
//! its key released.
//!
//! # Example
//!
//! ```ignore
//! let coalescer = RequestCoalescer::new();
//! let rates = coalescer
//!     .run_exclusive("bonus:rates", false, || async move { api.fetch_rate(Domain::Bonus).await })
//!     .await?;
//! ```

use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// The future every caller for one key awaits.
type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, String>>>;
type WeakFetch<T> = WeakShared<BoxFuture<'static, Result<T, String>>>;

struct Registration {
  id: u64,
  fetch: Box<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Registry {
  next_id: AtomicU64,
  in_flight: Mutex<HashMap<String, Registration>>,
}

impl Registry {
  fn lock(&self) -> MutexGuard<'_, HashMap<String, Registration>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Removes a registration when its fetch settles or the last caller awaiting
/// it is dropped.
struct Deregister {
  registry: Arc<Registry>,
  key: String,
  id: u64,
}

impl Drop for Deregister {
  fn drop(&mut self) {
    let mut in_flight = self.registry.lock();
    // A forced fetch may have replaced us under the same key
    if in_flight.get(&self.key).is_some_and(|r| r.id == self.id) {
      in_flight.remove(&self.key);
    }
  }
}

/// Registry of in-flight fetches, keyed by resource identity.
///
/// Cloning is cheap and clones share the same registry.
#[derive(Clone, Default)]
pub struct RequestCoalescer {
  registry: Arc<Registry>,
}

impl RequestCoalescer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run `producer` unless a fetch for `key` is already outstanding.
  ///
  /// With `force` set, a new fetch is started even if one is in flight; the
  /// older one keeps running and its existing callers still receive its result.
  pub async fn run_exclusive<T, F, Fut>(&self, key: &str, force: bool, producer: F) -> Result<T, String>
  where
    T: Clone + Send + Sync + 'static,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, String>> + Send + 'static,
  {
    if !force {
      if let Some(existing) = self.joinable::<T>(key) {
        debug!(key, "joining in-flight request");
        return existing.await;
      }
    }

    let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
    // Build the fetch outside the lock; the producer may be arbitrary code
    let fetch = producer();

    let shared = {
      let mut in_flight = self.registry.lock();

      // Someone may have registered while the producer ran
      let raced = if force {
        None
      } else {
        in_flight
          .get(key)
          .and_then(|r| r.fetch.downcast_ref::<WeakFetch<T>>())
          .and_then(WeakShared::upgrade)
      };

      match raced {
        Some(existing) => existing,
        None => {
          let guard = Deregister {
            registry: Arc::clone(&self.registry),
            key: key.to_string(),
            id,
          };
          let shared: SharedFetch<T> = async move {
            let result = fetch.await;
            drop(guard);
            result
          }
          .boxed()
          .shared();

          // Never polled yet, so a weak handle is always available
          if let Some(weak) = shared.downgrade() {
            debug!(key, id, force, "starting request");
            in_flight.insert(
              key.to_string(),
              Registration {
                id,
                fetch: Box::new(weak),
              },
            );
          }
          shared
        }
      }
    };

    shared.await
  }

  fn joinable<T>(&self, key: &str) -> Option<SharedFetch<T>>
  where
    T: Clone + Send + Sync + 'static,
  {
    let in_flight = self.registry.lock();
    let registration = in_flight.get(key)?;
    match registration.fetch.downcast_ref::<WeakFetch<T>>() {
      Some(weak) => weak.upgrade(),
      None => {
        warn!(key, "in-flight request has a different result type, not joining");
        None
      }
    }
  }

  /// Whether a fetch for `key` is currently outstanding.
  pub fn is_in_flight(&self, key: &str) -> bool {
    self.registry.lock().contains_key(key)
  }

  /// Number of keys with an outstanding fetch.
  pub fn len(&self) -> usize {
    self.registry.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Forget every registration. Outstanding fetches keep running for the
  /// callers already awaiting them.
  pub fn reset(&self) {
    self.registry.lock().clear();
  }
}

//! User-visible notifications (toasts). Fire-and-forget.

use tracing::{info, warn};

pub trait Notifier: Send + Sync {
  fn success(&self, message: &str);

  fn error(&self, message: &str);
}

/// Sends notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  fn success(&self, message: &str) {
    info!(target: "notify", "{}", message);
  }

  fn error(&self, message: &str) {
    warn!(target: "notify", "{}", message);
  }
}

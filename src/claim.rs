//! Claiming the accrued balance of a domain.
//!
//! A claim moves funds, so it is never queued or retried: a second call
//! while one is outstanding is turned away, and a success busts the domain's
//! cache with a forced refresh because only the server knows the new balance.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

use crate::api::ClaimResult;
use crate::manager::{DomainManager, RefreshOutcome};
use crate::slice::SliceState;

/// Why a claim was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
  AlreadyClaiming,
  NotAuthenticated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
  Claimed {
    result: ClaimResult,
    refresh: RefreshOutcome,
  },
  Skipped {
    reason: SkipReason,
  },
  Failed {
    message: String,
  },
  /// The identity changed while the claim was outstanding; its result was
  /// not recorded
  Superseded,
}

/// Last claim together with the auth epoch it was made under.
#[derive(Default)]
struct Recorded {
  epoch: u64,
  state: SliceState<ClaimResult>,
}

/// Resets the in-flight flag however the claim ends.
struct ClaimingGuard<'a>(&'a AtomicBool);

impl Drop for ClaimingGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::Release);
  }
}

pub struct ClaimController {
  manager: DomainManager,
  claiming: AtomicBool,
  result: Mutex<Recorded>,
}

impl ClaimController {
  pub fn new(manager: DomainManager) -> Self {
    Self {
      manager,
      claiming: AtomicBool::new(false),
      result: Mutex::new(Recorded::default()),
    }
  }

  pub fn is_claiming(&self) -> bool {
    self.claiming.load(Ordering::Acquire)
  }

  /// Outcome of the last successful claim. Kept in memory only and empty
  /// once the identity it was made under is gone.
  pub fn last_result(&self) -> SliceState<ClaimResult> {
    let epoch = self.manager.epoch();
    let mut recorded = self.result.lock().unwrap_or_else(PoisonError::into_inner);
    if recorded.epoch != epoch {
      *recorded = Recorded {
        epoch,
        state: SliceState::default(),
      };
    }
    recorded.state.clone()
  }

  /// Forget the last claim, e.g. after logout.
  pub fn reset(&self) {
    *self.result.lock().unwrap_or_else(PoisonError::into_inner) = Recorded::default();
  }

  pub async fn claim(&self) -> ClaimOutcome {
    let deps = self.manager.deps();
    let domain = self.manager.domain();

    let Some((username, token)) = deps.session.credentials() else {
      debug!(%domain, "claim skipped, no credentials");
      return ClaimOutcome::Skipped {
        reason: SkipReason::NotAuthenticated,
      };
    };

    if self
      .claiming
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .is_err()
    {
      debug!(%domain, "claim skipped, another claim is in flight");
      return ClaimOutcome::Skipped {
        reason: SkipReason::AlreadyClaiming,
      };
    }
    // Held through the follow-up refresh so the stale balance cannot be claimed twice
    let _guard = ClaimingGuard(&self.claiming);

    let epoch = self.manager.epoch();
    info!(%domain, epoch, "claiming balance");
    let result = deps.api.claim(domain, &username, &token).await;

    if self.manager.epoch() != epoch {
      warn!(%domain, epoch, ?result, "claim settled after an auth change, discarding");
      return ClaimOutcome::Superseded;
    }

    let result = match result {
      Ok(result) => result,
      Err(message) => {
        warn!(%domain, error = %message, "claim failed");
        deps.notifier.error(&message);
        return ClaimOutcome::Failed { message };
      }
    };

    info!(%domain, amount = result.amount_claimed, "claim succeeded");
    {
      let mut recorded = self.result.lock().unwrap_or_else(PoisonError::into_inner);
      let previous = if recorded.epoch == epoch {
        std::mem::take(&mut recorded.state)
      } else {
        SliceState::default()
      };
      *recorded = Recorded {
        epoch,
        state: previous.with_data(result.clone(), deps.clock.now()),
      };
    }
    deps
      .notifier
      .success(&format!("Claimed {:.2} from {}", result.amount_claimed, domain));

    let refresh = self.manager.refresh_all(true).await;
    ClaimOutcome::Claimed { result, refresh }
  }
}

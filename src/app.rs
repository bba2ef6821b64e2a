//! Wiring of the sync layer for the command line front end.

use color_eyre::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::api::{
  ClaimResult, DownlinePage, HttpApiClient, MemberDetail, MemberSummary, RateTable, Referral,
};
use crate::cache::{CacheStore, SqliteStorage};
use crate::claim::{ClaimController, ClaimOutcome};
use crate::clock::SystemClock;
use crate::coalesce::RequestCoalescer;
use crate::config::Config;
use crate::domain::Domain;
use crate::manager::{DomainManager, ManagerDeps, ManagerState, RefreshOutcome};
use crate::notify::TracingNotifier;
use crate::referrals::{PaginationQuery, SortOrder};
use crate::session::StaticSession;
use crate::slice::SliceState;

/// Everything known about one domain after a command ran.
#[derive(Debug, Serialize)]
pub struct DomainReport {
  pub domain: Domain,
  pub outcome: Option<RefreshOutcome>,
  pub state: ManagerState,
  pub rates: SliceState<RateTable>,
  pub summary: SliceState<MemberSummary>,
  pub detail: SliceState<MemberDetail>,
  pub referrals: SliceState<DownlinePage>,
  pub pagination: PaginationQuery,
  /// Referrals of the current page in the selected order
  pub sorted_referrals: Vec<Referral>,
}

#[derive(Debug, Serialize)]
pub struct ClaimReport {
  #[serde(flatten)]
  pub outcome: ClaimOutcome,
  pub last_claim: SliceState<ClaimResult>,
  pub dashboard: DomainReport,
}

struct DomainHandle {
  manager: DomainManager,
  claims: ClaimController,
}

pub struct App {
  deps: ManagerDeps,
  affiliate: DomainHandle,
  bonus: DomainHandle,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    let store = if config.cache.enabled {
      let storage = match &config.cache.path {
        Some(path) => SqliteStorage::open(path)?,
        None => SqliteStorage::open_default()?,
      };
      CacheStore::new(storage)
    } else {
      info!("cache disabled");
      CacheStore::disabled()
    };

    let api = HttpApiClient::new(&config.api.url)?;
    let session = StaticSession::new(config.username.clone(), Config::get_auth_token());

    Ok(Self::from_deps(ManagerDeps {
      api: Arc::new(api),
      session: Arc::new(session),
      store,
      coalescer: RequestCoalescer::new(),
      clock: Arc::new(SystemClock),
      notifier: Arc::new(TracingNotifier),
      stale_window: config.stale_window(),
      records_per_page: config.referrals.records_per_page,
    }))
  }

  /// One manager and claim controller per domain over shared collaborators.
  pub fn from_deps(deps: ManagerDeps) -> Self {
    let handle = |domain| {
      let manager = DomainManager::new(domain, deps.clone());
      DomainHandle {
        claims: ClaimController::new(manager.clone()),
        manager,
      }
    };

    Self {
      affiliate: handle(Domain::Affiliate),
      bonus: handle(Domain::Bonus),
      deps,
    }
  }

  fn handle(&self, domain: Domain) -> &DomainHandle {
    match domain {
      Domain::Affiliate => &self.affiliate,
      Domain::Bonus => &self.bonus,
    }
  }

  pub fn manager(&self, domain: Domain) -> &DomainManager {
    &self.handle(domain).manager
  }

  async fn initialize(&self, domain: Domain) -> Option<RefreshOutcome> {
    let authenticated = self.deps.session.is_authenticated();
    self.manager(domain).initialize(authenticated).await
  }

  /// Bring the given domains up to date, concurrently.
  pub async fn sync(&self, domains: &[Domain], force: bool) -> Vec<DomainReport> {
    let tasks = domains.iter().map(|&domain| async move {
      let mut outcome = self.initialize(domain).await;
      // Only a cached answer is overridden; a failure waits for the next request
      if force && matches!(outcome, None | Some(RefreshOutcome::Cached)) {
        outcome = Some(self.manager(domain).refresh_all(true).await);
      }
      self.report(domain, outcome)
    });
    futures::future::join_all(tasks).await
  }

  /// Show a referrals page, fetching it only if the cached one does not match.
  ///
  /// The requested page and order are applied before initializing, so the
  /// initial refresh already asks for the right page.
  pub async fn referrals(
    &self,
    domain: Domain,
    page: Option<u32>,
    sort: Option<SortOrder>,
  ) -> DomainReport {
    let manager = self.manager(domain);
    manager.set_authenticated(self.deps.session.is_authenticated());
    manager.set_pagination(sort, page);

    let initialized = self.initialize(domain).await;
    let outcome = match (initialized, manager.refresh_referrals(false).await) {
      (Some(refresh), RefreshOutcome::Cached) => refresh,
      (_, referrals) => referrals,
    };
    self.report(domain, Some(outcome))
  }

  pub async fn claim(&self, domain: Domain) -> ClaimReport {
    let handle = self.handle(domain);
    self.initialize(domain).await;

    let outcome = handle.claims.claim().await;
    ClaimReport {
      outcome,
      last_claim: handle.claims.last_result(),
      dashboard: self.report(domain, None),
    }
  }

  /// Forget everything cached for every domain.
  pub fn logout(&self) {
    for domain in Domain::ALL {
      let handle = self.handle(domain);
      handle.manager.clear();
      handle.claims.reset();
      self.deps.store.clear_domain(domain);
    }
    self.deps.coalescer.reset();
    info!("local state cleared");
  }

  pub fn report(&self, domain: Domain, outcome: Option<RefreshOutcome>) -> DomainReport {
    let manager = self.manager(domain);
    DomainReport {
      domain,
      outcome,
      state: manager.state(),
      rates: manager.rates(),
      summary: manager.summary(),
      detail: manager.detail(),
      referrals: manager.referrals(),
      pagination: manager.pagination(),
      sorted_referrals: manager.sorted_referrals(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::claim::SkipReason;
  use crate::slice::Status;
  use crate::testing::Harness;

  #[tokio::test]
  async fn test_sync_covers_both_domains() {
    let h = Harness::new();
    h.login();
    let app = App::from_deps(h.deps());

    let reports = app.sync(&Domain::ALL, false).await;
    assert_eq!(reports.len(), 2);
    for report in &reports {
      assert_eq!(report.outcome, Some(RefreshOutcome::Fetched));
      assert_eq!(report.state.status, Status::Success);
      assert_eq!(report.sorted_referrals.len(), 4);
    }
    assert_eq!(h.api.rate_calls(), 2);
  }

  #[tokio::test]
  async fn test_forced_sync_after_warm_start() {
    let h = Harness::new();
    App::from_deps(h.deps()).sync(&[Domain::Bonus], false).await;

    let app = App::from_deps(h.deps());
    let cached = app.sync(&[Domain::Bonus], false).await;
    assert_eq!(cached[0].outcome, Some(RefreshOutcome::Cached));
    assert_eq!(h.api.rate_calls(), 1);

    let forced = app.sync(&[Domain::Bonus], true).await;
    assert_eq!(forced[0].outcome, Some(RefreshOutcome::Fetched));
    assert_eq!(h.api.rate_calls(), 2);
  }

  #[tokio::test]
  async fn test_referrals_with_client_sort() {
    let h = Harness::new();
    h.login();
    let app = App::from_deps(h.deps());

    let report = app
      .referrals(Domain::Affiliate, None, Some(SortOrder::NicknameAsc))
      .await;
    assert_eq!(report.outcome, Some(RefreshOutcome::Fetched));
    assert_eq!(report.pagination.sort_order, SortOrder::NicknameAsc);
    let names: Vec<_> = report.sorted_referrals.iter().map(|r| r.nickname.as_str()).collect();
    assert_eq!(names, vec!["alice", "Bob", "mallory", "Trent"]);
    assert_eq!(h.api.downline_calls(), 1);
  }

  #[tokio::test]
  async fn test_referrals_page_and_sort_fetch_once() {
    let h = Harness::new();
    h.login();
    let app = App::from_deps(h.deps());

    let report = app
      .referrals(Domain::Bonus, Some(3), Some(SortOrder::WageredDesc))
      .await;
    assert_eq!(report.outcome, Some(RefreshOutcome::Fetched));
    assert_eq!(report.pagination.current_page, 3);
    assert_eq!(h.api.downline_calls(), 1);
    let request = h.api.last_downline_request().unwrap();
    assert_eq!(request.page, 3);
    assert_eq!(request.sort_order, SortOrder::WageredDesc);

    // Same page again on a warm manager is served from the cache
    let again = app
      .referrals(Domain::Bonus, Some(3), Some(SortOrder::WageredDesc))
      .await;
    assert_eq!(again.outcome, Some(RefreshOutcome::Cached));
    assert_eq!(h.api.downline_calls(), 1);
  }

  #[tokio::test]
  async fn test_forced_sync_does_not_retry_failure() {
    let h = Harness::new();
    h.api.respond(|r| r.rate = Err("network down".into()));
    let app = App::from_deps(h.deps());

    let reports = app.sync(&[Domain::Bonus], true).await;
    assert_eq!(
      reports[0].outcome,
      Some(RefreshOutcome::Failed("network down".into()))
    );
    assert_eq!(h.api.rate_calls(), 1);
    assert_eq!(h.notifier.errors(), vec!["network down"]);
  }

  #[tokio::test]
  async fn test_claim_report() {
    let h = Harness::new();
    h.login();
    let app = App::from_deps(h.deps());

    let report = app.claim(Domain::Bonus).await;
    assert!(matches!(report.outcome, ClaimOutcome::Claimed { .. }));
    assert_eq!(
      report.dashboard.summary.data().map(|s| s.claimable),
      Some(27.5)
    );

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["outcome"], "claimed");
    assert_eq!(json["result"]["amountClaimed"], 12.5);
  }

  #[tokio::test]
  async fn test_anonymous_claim_is_skipped() {
    let h = Harness::new();
    let app = App::from_deps(h.deps());

    let report = app.claim(Domain::Affiliate).await;
    assert_eq!(
      report.outcome,
      ClaimOutcome::Skipped {
        reason: SkipReason::NotAuthenticated
      }
    );
  }

  #[tokio::test]
  async fn test_logout_wipes_cache() {
    let h = Harness::new();
    h.login();
    let app = App::from_deps(h.deps());
    app.sync(&Domain::ALL, false).await;

    app.logout();
    for domain in Domain::ALL {
      let report = app.report(domain, None);
      assert_eq!(report.rates.data(), None);
      assert_eq!(report.summary.data(), None);
    }

    let restarted = App::from_deps(h.deps());
    assert_eq!(restarted.report(Domain::Bonus, None).rates.data(), None);
  }
}

//! Domain manager: orchestrates the slices of one feature domain.
//!
//! The manager decides, for every refresh request, whether cached data is
//! still good enough, funnels concurrent refreshes through the shared
//! [`RequestCoalescer`], and hard-resets everything it owns when the
//! authentication state flips.
//!
//! Every refresh is tagged with the auth epoch it started under. Results that
//! arrive after the epoch moved on (login or logout happened meanwhile) are
//! dropped instead of being committed over freshly cleared state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::api::{
  DownlinePage, DownlineRequest, MemberDetail, MemberSummary, RateTable, Referral, RewardsApi,
};
use crate::cache::{refresh_key, CacheKey, CacheStore, Resource};
use crate::clock::Clock;
use crate::coalesce::RequestCoalescer;
use crate::domain::Domain;
use crate::notify::Notifier;
use crate::referrals::{PaginationQuery, ReferralsSlice, ServerQuery, SortOrder};
use crate::session::SessionProvider;
use crate::slice::{Slice, SliceState, Status};

/// Collaborators and policy shared by the managers of every domain.
#[derive(Clone)]
pub struct ManagerDeps {
  pub api: Arc<dyn RewardsApi>,
  pub session: Arc<dyn SessionProvider>,
  pub store: CacheStore,
  pub coalescer: RequestCoalescer,
  pub clock: Arc<dyn Clock>,
  pub notifier: Arc<dyn Notifier>,
  /// Maximum age of a full refresh before it is redone
  pub stale_window: Duration,
  pub records_per_page: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ManagerState {
  pub is_initialized: bool,
  pub is_authenticated: bool,
  pub last_fetch_timestamp: Option<DateTime<Utc>>,
  pub status: Status,
  pub error: Option<String>,
}

/// How a refresh request was satisfied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "snake_case")]
pub enum RefreshOutcome {
  /// Cached data was fresh; nothing was fetched
  Cached,
  /// New data was fetched and committed
  Fetched,
  /// At least one fetch failed; successful parts were still committed
  Failed(String),
  /// Results arrived after an auth change and were dropped
  Superseded,
  /// Nothing can be fetched under the current identity
  Skipped,
}

impl RefreshOutcome {
  pub fn is_failed(&self) -> bool {
    matches!(self, RefreshOutcome::Failed(_))
  }
}

/// Persisted bookkeeping, read back after a restart.
#[derive(Debug, Serialize, Deserialize)]
struct ManagerMeta {
  is_authenticated: bool,
  last_fetch: Option<DateTime<Utc>>,
}

/// Results of the authenticated half of a refresh.
struct MemberResults {
  summary: Result<MemberSummary, String>,
  downline: Result<DownlinePage, String>,
  detail: Result<MemberDetail, String>,
}

struct Core {
  state: ManagerState,
  epoch: u64,
  rates: Slice<RateTable>,
  summary: Slice<MemberSummary>,
  detail: Slice<MemberDetail>,
  referrals: ReferralsSlice,
}

impl Core {
  fn clear_slices(&mut self) {
    self.rates.clear();
    self.summary.clear();
    self.detail.clear();
    self.referrals.clear();
  }
}

struct Inner {
  domain: Domain,
  deps: ManagerDeps,
  meta_key: CacheKey,
  core: Mutex<Core>,
}

/// Manager of one domain's slices. Cloning yields another handle to the same
/// state.
#[derive(Clone)]
pub struct DomainManager {
  inner: Arc<Inner>,
}

impl DomainManager {
  pub fn new(domain: Domain, deps: ManagerDeps) -> Self {
    let store = deps.store.clone();
    let meta_key = CacheKey::new(domain, Resource::ManagerMeta);

    // Remember which side of the login boundary the cache was written on, so
    // a restart under the same identity does not count as a transition
    let persisted_auth = store
      .get::<ManagerMeta>(&meta_key)
      .is_some_and(|meta| meta.is_authenticated);

    let core = Core {
      state: ManagerState {
        is_authenticated: persisted_auth,
        ..ManagerState::default()
      },
      epoch: 0,
      rates: Slice::new(CacheKey::new(domain, Resource::Rates), store.clone()),
      summary: Slice::new(CacheKey::new(domain, Resource::Summary), store.clone()),
      detail: Slice::new(CacheKey::new(domain, Resource::Detail), store.clone()),
      referrals: ReferralsSlice::new(domain, store, deps.records_per_page),
    };

    Self {
      inner: Arc::new(Inner {
        domain,
        deps,
        meta_key,
        core: Mutex::new(core),
      }),
    }
  }

  pub fn domain(&self) -> Domain {
    self.inner.domain
  }

  pub(crate) fn deps(&self) -> &ManagerDeps {
    &self.inner.deps
  }

  fn lock(&self) -> MutexGuard<'_, Core> {
    self.inner.core.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Reconcile the auth state and, once per auth epoch, hydrate from the
  /// cache and refresh.
  ///
  /// Returns `None` when this epoch was already initialized.
  pub async fn initialize(&self, is_authenticated: bool) -> Option<RefreshOutcome> {
    self.set_authenticated(is_authenticated);

    {
      let mut core = self.lock();
      if core.state.is_initialized {
        debug!(domain = %self.domain(), "already initialized");
        return None;
      }
      self.hydrate(&mut core);
      core.state.is_initialized = true;
    }

    Some(self.refresh_all(false).await)
  }

  /// Load whatever the cache has for the current identity.
  fn hydrate(&self, core: &mut Core) {
    let authenticated = core.state.is_authenticated;

    let mut complete = core.rates.initialize_from_cache();
    if authenticated {
      complete &= core.summary.initialize_from_cache();
      complete &= core.detail.initialize_from_cache();
      complete &= core.referrals.initialize_from_cache();
    }

    // Only trust the refresh timestamp if every slice it covers came back
    match self.inner.deps.store.get::<ManagerMeta>(&self.inner.meta_key) {
      Some(meta) if complete && meta.is_authenticated == authenticated => {
        core.state.last_fetch_timestamp = meta.last_fetch;
        if meta.last_fetch.is_some() {
          core.state.status = Status::Success;
        }
      }
      _ => {}
    }

    debug!(
      domain = %self.domain(),
      complete,
      last_fetch = ?core.state.last_fetch_timestamp,
      "hydrated from cache"
    );
  }

  /// Record the auth state. A change is a hard reset: every slice and the
  /// manager's own metadata are cleared and the epoch moves on.
  ///
  /// Returns whether a reset happened.
  pub fn set_authenticated(&self, is_authenticated: bool) -> bool {
    let mut core = self.lock();
    if core.state.is_authenticated == is_authenticated {
      return false;
    }

    core.epoch += 1;
    info!(
      domain = %self.domain(),
      authenticated = is_authenticated,
      epoch = core.epoch,
      "authentication changed, resetting domain state"
    );

    core.clear_slices();
    self.inner.deps.store.clear(&self.inner.meta_key);
    core.state = ManagerState {
      is_authenticated,
      ..ManagerState::default()
    };
    self.persist_meta(&core.state);
    true
  }

  /// Refresh every resource this domain owns, unless the last full refresh
  /// is still fresh.
  pub async fn refresh_all(&self, force: bool) -> RefreshOutcome {
    let deps = &self.inner.deps;

    let (epoch, authenticated) = {
      let mut core = self.lock();
      let now = deps.clock.now();
      let stale = force
        || core
          .state
          .last_fetch_timestamp
          .map_or(true, |last| now - last > deps.stale_window);

      if !stale && core.state.status == Status::Success {
        debug!(domain = %self.domain(), "serving cached data");
        return RefreshOutcome::Cached;
      }

      core.state.status = Status::Loading;
      (core.epoch, core.state.is_authenticated)
    };

    let key = format!("{}#{}", refresh_key(self.domain()), epoch);
    let manager = self.clone();
    deps
      .coalescer
      .run_exclusive(&key, force, move || async move {
        Ok(manager.fetch_all(epoch, authenticated).await)
      })
      .await
      .unwrap_or_else(RefreshOutcome::Failed)
  }

  async fn fetch_all(&self, epoch: u64, authenticated: bool) -> RefreshOutcome {
    let deps = &self.inner.deps;
    let domain = self.domain();

    let credentials = if authenticated {
      deps.session.credentials()
    } else {
      None
    };
    if authenticated && credentials.is_none() {
      debug!(%domain, "no credentials, skipping authenticated resources");
    }

    let query = {
      let mut core = self.lock();
      if core.epoch != epoch {
        return RefreshOutcome::Superseded;
      }
      core.rates.set_loading();
      if credentials.is_some() {
        core.summary.set_loading();
        core.detail.set_loading();
        core.referrals.set_loading();
      }
      core.referrals.query().server_query()
    };

    info!(%domain, epoch, authenticated = credentials.is_some(), "refreshing");
    let rates = deps.api.fetch_rate(domain);
    let (rates, member) = match credentials {
      Some((username, token)) => {
        let request = DownlineRequest {
          username: username.clone(),
          token: token.clone(),
          page: query.page,
          page_size: query.page_size,
          sort_order: query.sort_order,
        };
        let (rates, summary, downline, detail) = futures::join!(
          rates,
          deps.api.fetch_member_summary(domain, &username, &token),
          deps.api.fetch_downline(domain, request),
          deps.api.fetch_member_detail(domain, &username, &token)
        );
        (
          rates,
          Some(MemberResults {
            summary,
            downline,
            detail,
          }),
        )
      }
      None => (rates.await, None),
    };

    let outcome = self.commit_all(epoch, query, rates, member);
    if let RefreshOutcome::Failed(message) = &outcome {
      warn!(%domain, error = %message, "refresh failed");
      deps.notifier.error(message);
    }
    outcome
  }

  fn commit_all(
    &self,
    epoch: u64,
    query: ServerQuery,
    rates: Result<RateTable, String>,
    member: Option<MemberResults>,
  ) -> RefreshOutcome {
    let mut core = self.lock();
    if core.epoch != epoch {
      info!(
        domain = %self.domain(),
        epoch,
        current = core.epoch,
        "discarding results from a previous auth epoch"
      );
      return RefreshOutcome::Superseded;
    }

    let now = self.inner.deps.clock.now();
    let mut errors = Vec::new();

    commit_slice(&mut core.rates, rates, now, &mut errors);
    if let Some(member) = member {
      commit_slice(&mut core.summary, member.summary, now, &mut errors);
      commit_slice(&mut core.detail, member.detail, now, &mut errors);
      match member.downline {
        Ok(page) => core.referrals.commit_page(page, query, now),
        Err(e) => {
          core.referrals.set_error(&e);
          push_unique(&mut errors, e);
        }
      }
    }

    if errors.is_empty() {
      core.state.status = Status::Success;
      core.state.error = None;
      core.state.last_fetch_timestamp = Some(now);
      self.persist_meta(&core.state);
      RefreshOutcome::Fetched
    } else {
      let message = errors.join("; ");
      core.state.status = Status::Error;
      core.state.error = Some(message.clone());
      RefreshOutcome::Failed(message)
    }
  }

  /// Refetch the referrals page if the cached one no longer matches the
  /// desired page/sort or has aged out.
  pub async fn refresh_referrals(&self, force: bool) -> RefreshOutcome {
    let deps = &self.inner.deps;

    let Some((username, token)) = deps.session.credentials() else {
      return RefreshOutcome::Skipped;
    };

    let (epoch, query) = {
      let mut core = self.lock();
      if !core.state.is_authenticated {
        return RefreshOutcome::Skipped;
      }
      if !force && !core.referrals.needs_fetch(deps.clock.now(), deps.stale_window) {
        debug!(domain = %self.domain(), "referrals page is current");
        return RefreshOutcome::Cached;
      }
      core.referrals.set_loading();
      (core.epoch, core.referrals.query().server_query())
    };

    let key = format!(
      "{}#{}#{}:{}:{}",
      CacheKey::new(self.domain(), Resource::Downline),
      epoch,
      query.page,
      query.sort_order.as_str(),
      query.page_size
    );
    let manager = self.clone();
    deps
      .coalescer
      .run_exclusive(&key, force, move || async move {
        Ok(manager.fetch_referrals(epoch, query, username, token).await)
      })
      .await
      .unwrap_or_else(RefreshOutcome::Failed)
  }

  async fn fetch_referrals(
    &self,
    epoch: u64,
    query: ServerQuery,
    username: String,
    token: String,
  ) -> RefreshOutcome {
    let deps = &self.inner.deps;
    let domain = self.domain();
    debug!(%domain, ?query, "fetching referrals page");

    let request = DownlineRequest {
      username,
      token,
      page: query.page,
      page_size: query.page_size,
      sort_order: query.sort_order,
    };
    let result = deps.api.fetch_downline(domain, request).await;

    let outcome = {
      let mut core = self.lock();
      if core.epoch != epoch {
        info!(%domain, epoch, "discarding referrals page from a previous auth epoch");
        return RefreshOutcome::Superseded;
      }
      match result {
        Ok(page) => {
          core.referrals.commit_page(page, query, deps.clock.now());
          RefreshOutcome::Fetched
        }
        Err(e) => {
          core.referrals.set_error(&e);
          RefreshOutcome::Failed(e)
        }
      }
    };

    if let RefreshOutcome::Failed(message) = &outcome {
      warn!(%domain, error = %message, "referrals fetch failed");
      deps.notifier.error(message);
    }
    outcome
  }

  /// Apply an order and then a page without fetching. The order goes first
  /// because changing it returns to page 1.
  pub fn set_pagination(&self, order: Option<SortOrder>, page: Option<u32>) {
    let mut core = self.lock();
    if let Some(order) = order {
      core.referrals.set_sort_order(order);
    }
    if let Some(page) = page {
      core.referrals.set_page(page);
    }
  }

  /// Move to another referrals page, fetching it if needed.
  pub async fn set_page(&self, page: u32) -> RefreshOutcome {
    self.lock().referrals.set_page(page);
    self.refresh_referrals(false).await
  }

  /// Change the referrals order. Always returns to the first page; orders
  /// that only sort locally do not refetch.
  pub async fn set_sort_order(&self, order: SortOrder) -> RefreshOutcome {
    self.lock().referrals.set_sort_order(order);
    self.refresh_referrals(false).await
  }

  pub async fn set_records_per_page(&self, records_per_page: u32) -> RefreshOutcome {
    self.lock().referrals.set_records_per_page(records_per_page);
    self.refresh_referrals(false).await
  }

  /// Unconditional reset, used on explicit logout.
  pub fn clear(&self) {
    let mut core = self.lock();
    core.epoch += 1;
    info!(domain = %self.domain(), epoch = core.epoch, "clearing domain state");
    core.clear_slices();
    self.inner.deps.store.clear(&self.inner.meta_key);
    core.state = ManagerState::default();
  }

  fn persist_meta(&self, state: &ManagerState) {
    let meta = ManagerMeta {
      is_authenticated: state.is_authenticated,
      last_fetch: state.last_fetch_timestamp,
    };
    self.inner.deps.store.set(&self.inner.meta_key, &meta);
  }

  // Accessors for rendering

  pub fn state(&self) -> ManagerState {
    self.lock().state.clone()
  }

  pub fn epoch(&self) -> u64 {
    self.lock().epoch
  }

  pub fn rates(&self) -> SliceState<RateTable> {
    self.lock().rates.snapshot()
  }

  pub fn summary(&self) -> SliceState<MemberSummary> {
    self.lock().summary.snapshot()
  }

  pub fn detail(&self) -> SliceState<MemberDetail> {
    self.lock().detail.snapshot()
  }

  pub fn referrals(&self) -> SliceState<DownlinePage> {
    self.lock().referrals.snapshot()
  }

  pub fn pagination(&self) -> PaginationQuery {
    self.lock().referrals.query()
  }

  pub fn sorted_referrals(&self) -> Vec<Referral> {
    self.lock().referrals.sorted_data()
  }
}

fn commit_slice<T>(
  slice: &mut Slice<T>,
  result: Result<T, String>,
  now: DateTime<Utc>,
  errors: &mut Vec<String>,
) where
  T: Clone + Serialize + serde::de::DeserializeOwned,
{
  match result {
    Ok(value) => slice.set_data(value, now),
    Err(e) => {
      slice.set_error(&e);
      push_unique(errors, e);
    }
  }
}

fn push_unique(errors: &mut Vec<String>, message: String) {
  if !errors.contains(&message) {
    errors.push(message);
  }
}

//! Referrals slice: a downline page plus its pagination and sort controller.

use chrono::{DateTime, Duration, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::debug;

use crate::api::{DownlinePage, Referral};
use crate::cache::{CacheKey, CacheStore, Resource};
use crate::domain::Domain;
use crate::slice::{Slice, SliceState};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum SortOrder {
  /// Newest referrals first
  #[default]
  JoinedDesc,
  JoinedAsc,
  WageredDesc,
  WageredAsc,
  /// Alphabetical by display name, sorted locally
  NicknameAsc,
  NicknameDesc,
}

impl SortOrder {
  pub fn as_str(&self) -> &'static str {
    match self {
      SortOrder::JoinedDesc => "joined_desc",
      SortOrder::JoinedAsc => "joined_asc",
      SortOrder::WageredDesc => "wagered_desc",
      SortOrder::WageredAsc => "wagered_asc",
      SortOrder::NicknameAsc => "nickname_asc",
      SortOrder::NicknameDesc => "nickname_desc",
    }
  }

  /// Orders the backend does not know about; applied to the fetched page only.
  pub fn is_client_only(&self) -> bool {
    matches!(self, SortOrder::NicknameAsc | SortOrder::NicknameDesc)
  }

  /// The order actually requested from the backend.
  pub fn server_order(&self) -> SortOrder {
    if self.is_client_only() {
      SortOrder::default()
    } else {
      *self
    }
  }
}

/// What the user currently wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PaginationQuery {
  /// 1-based
  pub current_page: u32,
  pub sort_order: SortOrder,
  pub records_per_page: u32,
}

impl PaginationQuery {
  pub fn new(records_per_page: u32) -> Self {
    Self {
      current_page: 1,
      sort_order: SortOrder::default(),
      records_per_page: records_per_page.max(1),
    }
  }

  /// The part of the query that changes what the backend returns.
  pub fn server_query(&self) -> ServerQuery {
    ServerQuery {
      page: self.current_page,
      sort_order: self.sort_order.server_order(),
      page_size: self.records_per_page,
    }
  }
}

/// Server-relevant projection of a [`PaginationQuery`]; persisted next to the
/// cached page it produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerQuery {
  pub page: u32,
  pub sort_order: SortOrder,
  pub page_size: u32,
}

pub struct ReferralsSlice {
  slice: Slice<DownlinePage>,
  query: PaginationQuery,
  /// Query the cached page was fetched with
  fetched_with: Option<ServerQuery>,
  meta_key: CacheKey,
  store: CacheStore,
}

impl ReferralsSlice {
  pub fn new(domain: Domain, store: CacheStore, records_per_page: u32) -> Self {
    Self {
      slice: Slice::new(CacheKey::new(domain, Resource::Downline), store.clone()),
      query: PaginationQuery::new(records_per_page),
      fetched_with: None,
      meta_key: CacheKey::new(domain, Resource::ReferralsMeta),
      store,
    }
  }

  pub fn query(&self) -> PaginationQuery {
    self.query
  }

  pub fn state(&self) -> &SliceState<DownlinePage> {
    self.slice.state()
  }

  pub fn snapshot(&self) -> SliceState<DownlinePage> {
    self.slice.snapshot()
  }

  pub fn fetched_with(&self) -> Option<ServerQuery> {
    self.fetched_with
  }

  /// Returns whether the page changed.
  pub fn set_page(&mut self, page: u32) -> bool {
    let page = page.max(1);
    let changed = self.query.current_page != page;
    self.query.current_page = page;
    changed
  }

  /// Always goes back to the first page: the old index may not exist under
  /// the new order.
  pub fn set_sort_order(&mut self, order: SortOrder) {
    self.query.sort_order = order;
    self.query.current_page = 1;
  }

  pub fn set_records_per_page(&mut self, records_per_page: u32) {
    self.query.records_per_page = records_per_page.max(1);
    self.query.current_page = 1;
  }

  /// Whether the cached page cannot serve the current query.
  pub fn needs_fetch(&self, now: DateTime<Utc>, stale_window: Duration) -> bool {
    if self.fetched_with != Some(self.query.server_query()) {
      return true;
    }
    match self.slice.state().last_fetched {
      Some(fetched_at) => now - fetched_at > stale_window,
      None => true,
    }
  }

  pub fn set_loading(&mut self) {
    self.slice.set_loading();
  }

  pub fn set_error(&mut self, message: &str) {
    self.slice.set_error(message);
  }

  /// Commit a page fetched for `query`, persisting which query produced it.
  pub fn commit_page(&mut self, page: DownlinePage, query: ServerQuery, now: DateTime<Utc>) {
    self.slice.set_data(page, now);
    self.fetched_with = Some(query);
    self.store.set(&self.meta_key, &query);
  }

  /// The current page in the selected order. Client-only orders re-sort the
  /// fetched records in memory.
  pub fn sorted_data(&self) -> Vec<Referral> {
    let mut records = self
      .slice
      .state()
      .data()
      .map(|page| page.records.clone())
      .unwrap_or_default();

    match self.query.sort_order {
      SortOrder::NicknameAsc => records.sort_by(compare_nickname),
      SortOrder::NicknameDesc => records.sort_by(|a, b| compare_nickname(b, a)),
      _ => {}
    }
    records
  }

  pub fn initialize_from_cache(&mut self) -> bool {
    if !self.slice.initialize_from_cache() {
      return false;
    }
    self.fetched_with = self.store.get(&self.meta_key);
    debug!(fetched_with = ?self.fetched_with, "hydrated referrals page");
    true
  }

  /// Drop the page, its metadata and the pagination state.
  pub fn clear(&mut self) {
    self.slice.clear();
    self.store.clear(&self.meta_key);
    self.fetched_with = None;
    self.query = PaginationQuery::new(self.query.records_per_page);
  }
}

fn compare_nickname(a: &Referral, b: &Referral) -> Ordering {
  display_name(a)
    .to_lowercase()
    .cmp(&display_name(b).to_lowercase())
    .then_with(|| a.username.cmp(&b.username))
}

fn display_name(referral: &Referral) -> &str {
  if referral.nickname.is_empty() {
    &referral.username
  } else {
    &referral.nickname
  }
}

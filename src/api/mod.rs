//! Boundary to the rewards backend.
//!
//! The sync core only depends on [`RewardsApi`]; [`HttpApiClient`] is the
//! production implementation.

mod client;
mod types;

pub use client::HttpApiClient;
pub use types::{
  ApiEnvelope, ClaimResult, DownlinePage, DownlineRequest, MemberDetail, MemberSummary, RateTable,
  RateTier, Referral,
};

use futures::future::BoxFuture;

use crate::domain::Domain;

/// Future returned by every API call. Failures are human-readable messages.
pub type ApiFuture<T> = BoxFuture<'static, Result<T, String>>;

/// Remote operations the sync core consumes.
pub trait RewardsApi: Send + Sync {
  /// Public rate table; needs no credentials.
  fn fetch_rate(&self, domain: Domain) -> ApiFuture<RateTable>;

  /// One page of the member's referrals.
  fn fetch_downline(&self, domain: Domain, request: DownlineRequest) -> ApiFuture<DownlinePage>;

  /// Dashboard totals, including the claimable balance.
  fn fetch_member_summary(&self, domain: Domain, username: &str, token: &str)
    -> ApiFuture<MemberSummary>;

  fn fetch_member_detail(&self, domain: Domain, username: &str, token: &str)
    -> ApiFuture<MemberDetail>;

  /// Move the claimable balance to the member's wallet.
  fn claim(&self, domain: Domain, username: &str, token: &str) -> ApiFuture<ClaimResult>;
}

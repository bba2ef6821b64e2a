//! Key table for everything the sync layer persists.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::domain::Domain;

/// Every resource a domain persists or fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
  Rates,
  Downline,
  Summary,
  Detail,
  /// Manager bookkeeping: last full refresh and the auth state it ran under
  ManagerMeta,
  /// Page/sort/page size the cached downline page was fetched with
  ReferralsMeta,
}

impl Resource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Resource::Rates => "rates",
      Resource::Downline => "downline",
      Resource::Summary => "summary",
      Resource::Detail => "detail",
      Resource::ManagerMeta => "manager_meta",
      Resource::ReferralsMeta => "referrals_meta",
    }
  }
}

/// Stable key of one persisted resource within one domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub domain: Domain,
  pub resource: Resource,
}

impl CacheKey {
  pub const fn new(domain: Domain, resource: Resource) -> Self {
    Self { domain, resource }
  }

  /// Partition this key lives in.
  pub fn namespace(&self) -> &'static str {
    self.domain.as_str()
  }

  /// Human readable form, e.g. `bonus:summary`.
  pub fn description(&self) -> String {
    format!("{}:{}", self.domain.as_str(), self.resource.as_str())
  }

  /// Fixed-length storage key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.domain.as_str(), self.resource.as_str())
  }
}

/// Coalescer key for a domain-wide refresh.
pub fn refresh_key(domain: Domain) -> String {
  format!("{}:refresh_all", domain.as_str())
}

#[cfg(test)]
mod tests {
  use super::*;

  const RESOURCES: [Resource; 6] = [
    Resource::Rates,
    Resource::Downline,
    Resource::Summary,
    Resource::Detail,
    Resource::ManagerMeta,
    Resource::ReferralsMeta,
  ];

  #[test]
  fn test_keys_are_unique_across_domains() {
    let mut seen = std::collections::HashSet::new();
    for domain in Domain::ALL {
      for resource in RESOURCES {
        assert!(seen.insert(CacheKey::new(domain, resource).cache_hash()));
      }
    }
    assert_eq!(seen.len(), 12);
  }

  #[test]
  fn test_description_matches_display() {
    let key = CacheKey::new(Domain::Bonus, Resource::Summary);
    assert_eq!(key.description(), "bonus:summary");
    assert_eq!(key.to_string(), key.description());
    assert_eq!(key.cache_hash().len(), 64);
  }
}

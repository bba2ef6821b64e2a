//! Wire and domain types for the rewards API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::referrals::SortOrder;

/// Response envelope used by every endpoint:
/// `{"error": false, "data": ...}` or `{"error": true, "message": "..."}`.
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope<T> {
  pub error: bool,
  #[serde(default)]
  pub message: Option<String>,
  pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
  pub fn into_result(self) -> Result<T, String> {
    if self.error {
      return Err(
        self
          .message
          .filter(|m| !m.trim().is_empty())
          .unwrap_or_else(|| "Unknown API error".to_string()),
      );
    }
    self
      .data
      .ok_or_else(|| "API response is missing data".to_string())
  }
}

// ============================================================================
// Rates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateTier {
  pub level: u32,
  /// Share of the referred wager paid out, e.g. 0.15 for 15%
  pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateTable {
  #[serde(default)]
  pub tiers: Vec<RateTier>,
}

// ============================================================================
// Downline
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Referral {
  pub username: String,
  #[serde(default)]
  pub nickname: String,
  pub joined_at: DateTime<Utc>,
  #[serde(default)]
  pub total_wagered: f64,
  #[serde(default)]
  pub earned: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownlinePage {
  #[serde(default)]
  pub records: Vec<Referral>,
  #[serde(default)]
  pub total_records: u64,
  #[serde(default)]
  pub page: u32,
}

/// Parameters of a downline page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownlineRequest {
  pub username: String,
  pub token: String,
  pub page: u32,
  pub page_size: u32,
  /// Always a server-side order
  pub sort_order: SortOrder,
}

// ============================================================================
// Member summary and detail
// ============================================================================

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSummary {
  #[serde(default)]
  pub total_earned: f64,
  #[serde(default)]
  pub claimable: f64,
  #[serde(default)]
  pub total_referrals: u64,
  #[serde(default)]
  pub active_referrals: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDetail {
  pub username: String,
  #[serde(default)]
  pub referral_code: Option<String>,
  #[serde(default)]
  pub tier: u32,
  #[serde(default)]
  pub referred_by: Option<String>,
}

// ============================================================================
// Claim
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimResult {
  pub amount_claimed: f64,
}

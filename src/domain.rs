use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Feature domain that owns its own manager, slices and cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
  Affiliate,
  Bonus,
}

impl Domain {
  pub const ALL: [Domain; 2] = [Domain::Affiliate, Domain::Bonus];

  pub fn as_str(&self) -> &'static str {
    match self {
      Domain::Affiliate => "affiliate",
      Domain::Bonus => "bonus",
    }
  }
}

impl fmt::Display for Domain {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

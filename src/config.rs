use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  /// Account the token belongs to. Without it nothing authenticated is fetched.
  pub username: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub referrals: ReferralsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL; domains are addressed below it, e.g. `{url}/affiliate/rates`
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Age after which a full refresh is redone
  #[serde(default = "default_stale_secs")]
  pub stale_secs: u64,
  /// Database file (defaults to the platform data directory)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_secs: default_stale_secs(),
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferralsConfig {
  #[serde(default = "default_records_per_page")]
  pub records_per_page: u32,
}

impl Default for ReferralsConfig {
  fn default() -> Self {
    Self {
      records_per_page: default_records_per_page(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_stale_secs() -> u64 {
  300
}

fn default_records_per_page() -> u32 {
  10
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./rewards-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/rewards-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/rewards-sync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("rewards-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("rewards-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    if Self::window_from_secs(self.cache.stale_secs).is_none() {
      return Err(eyre!(
        "cache.stale_secs is out of range: {}",
        self.cache.stale_secs
      ));
    }
    Ok(())
  }

  fn window_from_secs(secs: u64) -> Option<Duration> {
    Duration::try_seconds(i64::try_from(secs).ok()?)
  }

  /// Get the auth token from environment variables.
  ///
  /// Checks REWARDS_SYNC_TOKEN first, then REWARDS_TOKEN as fallback. A missing
  /// or blank token means the session is anonymous.
  pub fn get_auth_token() -> Option<String> {
    std::env::var("REWARDS_SYNC_TOKEN")
      .or_else(|_| std::env::var("REWARDS_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }

  /// Saturates for values `validate` would reject.
  pub fn stale_window(&self) -> Duration {
    Self::window_from_secs(self.cache.stale_secs).unwrap_or(Duration::MAX)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  url: https://rewards.example.com/api\n").unwrap();
    assert_eq!(config.api.url, "https://rewards.example.com/api");
    assert_eq!(config.username, None);
    assert!(config.cache.enabled);
    assert_eq!(config.cache.path, None);
    assert_eq!(config.stale_window(), Duration::minutes(5));
    assert_eq!(config.referrals.records_per_page, 10);
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
api:
  url: http://localhost:8080
username: alice
cache:
  enabled: false
  stale_secs: 60
  path: /tmp/rewards.db
referrals:
  records_per_page: 25
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.username.as_deref(), Some("alice"));
    assert!(!config.cache.enabled);
    assert_eq!(config.stale_window(), Duration::seconds(60));
    assert_eq!(config.cache.path, Some(PathBuf::from("/tmp/rewards.db")));
    assert_eq!(config.referrals.records_per_page, 25);
  }

  #[test]
  fn test_missing_api_section_is_rejected() {
    assert!(Config::parse("username: alice\n").is_err());
  }

  #[test]
  fn test_stale_window_bounds() {
    let yaml = |secs: u64| format!("api:\n  url: http://localhost\ncache:\n  stale_secs: {}\n", secs);

    let err = Config::parse(&yaml(10_000_000_000_000_000)).unwrap_err();
    assert!(err.to_string().contains("cache.stale_secs"));
    assert!(Config::parse(&yaml(u64::MAX)).is_err());

    let largest = (i64::MAX / 1000) as u64;
    let config = Config::parse(&yaml(largest)).unwrap();
    assert_eq!(config.stale_window(), Duration::seconds(largest as i64));

    let mut config = config;
    config.cache.stale_secs = u64::MAX;
    assert_eq!(config.stale_window(), Duration::MAX);
  }

  #[test]
  fn test_explicit_path_must_exist() {
    let err = Config::load(Some(Path::new("/nonexistent/rewards-sync.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}

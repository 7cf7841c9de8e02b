use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::{CachePolicy, CURRENT_SCHEMA_VERSION, DEFAULT_TTL};
use crate::client::RetryPolicy;
use crate::sync::SyncSettings;

const DEFAULT_API_URL: &str = "http://localhost:8080";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub api: ApiConfig,
  pub storage: StorageConfig,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub connectivity: ConnectivityConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// Base URL every endpoint is resolved against
  pub url: String,
  /// Per-request timeout in milliseconds
  pub timeout_ms: u64,
  /// Read retries after the first attempt
  pub max_retries: u32,
  /// First retry delay; doubles per retry
  pub retry_base_ms: u64,
  pub retry_max_delay_ms: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: DEFAULT_API_URL.to_string(),
      timeout_ms: 10_000,
      max_retries: 3,
      retry_base_ms: 1_000,
      retry_max_delay_ms: 30_000,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// SQLite file; defaults to $XDG_DATA_HOME/offsync/store.db
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub default_ttl_secs: u64,
  /// Bump to invalidate every entry written by an older build
  pub schema_version: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      default_ttl_secs: DEFAULT_TTL.as_secs(),
      schema_version: CURRENT_SCHEMA_VERSION.to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub interval_secs: u64,
  pub max_attempts: u32,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: 30,
      max_attempts: 3,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
  pub probe_interval_secs: u64,
  /// Defaults to `api.url`
  pub probe_url: Option<String>,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: 15,
      probe_url: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter used when RUST_LOG is unset
  pub level: String,
  /// Write daily-rotated log files here instead of stderr
  pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      directory: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offsync/config.yaml
  ///
  /// Without an explicit path, a missing file means built-in defaults.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("offsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not to an empty mapping
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  fn validate(&self) -> Result<()> {
    if self.sync.max_attempts == 0 {
      return Err(eyre!("sync.max_attempts must be at least 1"));
    }
    if self.sync.interval_secs == 0 {
      return Err(eyre!("sync.interval_secs must be at least 1"));
    }
    if self.connectivity.probe_interval_secs == 0 {
      return Err(eyre!("connectivity.probe_interval_secs must be at least 1"));
    }
    if self.api.timeout_ms == 0 {
      return Err(eyre!("api.timeout_ms must be at least 1"));
    }
    Ok(())
  }

  /// Get the API bearer token from the environment, if one is set.
  ///
  /// Checks OFFSYNC_API_TOKEN.
  pub fn get_api_token() -> Option<String> {
    std::env::var("OFFSYNC_API_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }

  pub fn api_timeout(&self) -> Duration {
    Duration::from_millis(self.api.timeout_ms)
  }

  pub fn probe_url(&self) -> &str {
    self.connectivity.probe_url.as_deref().unwrap_or(&self.api.url)
  }

  pub fn probe_interval(&self) -> Duration {
    Duration::from_secs(self.connectivity.probe_interval_secs)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries: self.api.max_retries,
      base_delay: Duration::from_millis(self.api.retry_base_ms),
      max_delay: Duration::from_millis(self.api.retry_max_delay_ms),
    }
  }

  pub fn cache_policy(&self) -> CachePolicy {
    CachePolicy {
      default_ttl: Duration::from_secs(self.cache.default_ttl_secs),
      schema_version: self.cache.schema_version.clone(),
    }
  }

  pub fn sync_settings(&self) -> SyncSettings {
    SyncSettings {
      interval: Duration::from_secs(self.sync.interval_secs),
      max_attempts: self.sync.max_attempts,
      request_timeout: self.api_timeout(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn test_defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.api.url, "http://localhost:8080");
    assert_eq!(config.api_timeout(), Duration::from_secs(10));
    assert_eq!(config.cache_policy(), CachePolicy::default());
    assert_eq!(config.retry_policy(), RetryPolicy::default());
    assert_eq!(config.sync_settings(), SyncSettings::default());
    assert_eq!(config.probe_url(), "http://localhost:8080");
    assert_eq!(config.probe_interval(), Duration::from_secs(15));
    assert_eq!(config.logging.level, "info");
  }

  #[test]
  fn test_partial_file_keeps_other_defaults() {
    let yaml = r#"
api:
  url: https://portal.example.com/api
sync:
  max_attempts: 5
"#;
    let config = Config::from_yaml(yaml).unwrap();
    assert_eq!(config.api.url, "https://portal.example.com/api");
    assert_eq!(config.api.timeout_ms, 10_000);
    assert_eq!(config.sync.max_attempts, 5);
    assert_eq!(config.sync.interval_secs, 30);
    assert_eq!(config.probe_url(), "https://portal.example.com/api");
  }

  #[test]
  fn test_retry_settings() {
    let yaml = "api:\n  max_retries: 0\n  retry_base_ms: 250\n  retry_max_delay_ms: 2000\n";
    let policy = Config::from_yaml(yaml).unwrap().retry_policy();
    assert_eq!(policy.max_retries, 0);
    assert_eq!(policy.delay(0), Duration::from_millis(250));
    assert_eq!(policy.delay(5), Duration::from_secs(2));
  }

  #[test]
  fn test_empty_file_is_defaults() {
    let config = Config::from_yaml("  \n").unwrap();
    assert_eq!(config.sync.max_attempts, 3);
  }

  #[test]
  fn test_load_explicit_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
      file,
      "cache:\n  default_ttl_secs: 60\n  schema_version: \"2.0.0\"\nconnectivity:\n  probe_url: http://probe.local"
    )
    .unwrap();

    let config = Config::load(Some(file.path())).unwrap();
    let policy = config.cache_policy();
    assert_eq!(policy.default_ttl, Duration::from_secs(60));
    assert_eq!(policy.schema_version, "2.0.0");
    assert_eq!(config.probe_url(), "http://probe.local");
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/offsync.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_zero_attempts_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sync:\n  max_attempts: 0").unwrap();

    assert!(Config::load(Some(file.path())).is_err());
  }

  #[test]
  fn test_malformed_yaml_reports_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "api: [not, a, mapping").unwrap();

    let err = Config::load(Some(file.path())).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
  }
}

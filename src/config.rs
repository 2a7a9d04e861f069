use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub poller: PollerConfig,
  #[serde(default)]
  pub dedupe: DedupeConfig,
  #[serde(default)]
  pub notifier: NotifierConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  pub url: String,
  pub timeout_secs: u64,
  pub user_agent: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: "https://api.hikka.io".to_string(),
      timeout_secs: 15,
      user_agent: concat!("anitrack/", env!("CARGO_PKG_VERSION")).to_string(),
    }
  }
}

/// Polling cadence per scheduling regime, plus feed paging.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
  /// Foreground on an unmetered network
  pub fast_interval_secs: u64,
  /// Foreground on a metered or unknown network
  pub constrained_interval_secs: u64,
  /// Background, any network
  pub background_interval_secs: u64,
  pub page_size: u32,
  /// Max notifications delivered per tick
  pub batch_size: usize,
}

impl Default for PollerConfig {
  fn default() -> Self {
    Self {
      fast_interval_secs: 30,
      constrained_interval_secs: 120,
      background_interval_secs: 900,
      page_size: 15,
      batch_size: 3,
    }
  }
}

impl PollerConfig {
  pub fn fast_interval(&self) -> Duration {
    Duration::from_secs(self.fast_interval_secs.max(1))
  }

  pub fn constrained_interval(&self) -> Duration {
    Duration::from_secs(self.constrained_interval_secs.max(1))
  }

  pub fn background_interval(&self) -> Duration {
    Duration::from_secs(self.background_interval_secs.max(1))
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DedupeConfig {
  /// Window during which a delivered event is suppressed
  pub ttl_hours: i64,
  /// Records older than this are dropped on load
  pub retention_days: i64,
  /// Max records kept
  pub capacity: usize,
}

impl Default for DedupeConfig {
  fn default() -> Self {
    Self {
      ttl_hours: 24,
      retention_days: 7,
      capacity: 500,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifierConfig {
  /// External command used to show desktop notifications (e.g. "notify-send").
  /// Notifications are printed to stdout when unset.
  pub command: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./anitrack.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/anitrack/config.yaml
  ///
  /// Built-in defaults are used when no file exists.
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
      None => {
        tracing::debug!("No config file found, using defaults");
        Ok(Self::default())
      }
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("anitrack.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("anitrack").join("config.yaml");
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
    // An empty file deserializes as null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the auth token from environment variables.
  ///
  /// Checks ANITRACK_AUTH_TOKEN first, then HIKKA_AUTH as fallback.
  /// Requests are sent anonymously when neither is set.
  pub fn get_auth_token() -> Option<String> {
    std::env::var("ANITRACK_AUTH_TOKEN")
      .or_else(|_| std::env::var("HIKKA_AUTH"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}

/// Directory for the state database and log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("anitrack"))
}

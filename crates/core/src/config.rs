//! Configuration system for syncdex.
//!
//! Config priority: explicit path > user (~/.config/syncdex/config.toml) > defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::path::{RootKind, SourceRoot};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Failed to read config {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Failed to parse config {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: toml::de::Error,
  },
  #[error("Source path must be absolute: {0}")]
  RelativeSource(PathBuf),
}

// ============================================================================
// Sources
// ============================================================================

/// A configured source root, as written in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
  /// Absolute path of the root directory
  pub path: PathBuf,

  /// Network roots are polled instead of watched (default: false)
  #[serde(default)]
  pub network: bool,
}

impl SourceConfig {
  pub fn kind(&self) -> RootKind {
    if self.network { RootKind::Network } else { RootKind::Local }
  }

  /// Canonicalize this source. Fails if the directory is missing.
  pub fn resolve(&self) -> std::io::Result<SourceRoot> {
    SourceRoot::resolve(&self.path, self.kind())
  }
}

// ============================================================================
// Sync Configuration
// ============================================================================

/// Change detection timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  /// Minutes between network polls (default: 15, minimum: 1)
  pub poll_interval_minutes: u64,

  /// Delay before the first scheduled network poll in seconds (default: 3)
  pub initial_poll_delay_secs: u64,

  /// Debounce window for local change events in milliseconds (default: 500)
  pub debounce_ms: u64,

  /// Upper bound on waiting for a file to stop growing (default: 2000)
  pub stability_max_wait_ms: u64,

  /// Interval between size samples while waiting (default: 300)
  pub stability_poll_interval_ms: u64,

  /// Capacity of the local mutation queue; senders wait when full (default: 256)
  pub worker_queue_capacity: usize,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      poll_interval_minutes: 15,
      initial_poll_delay_secs: 3,
      debounce_ms: 500,
      stability_max_wait_ms: 2000,
      stability_poll_interval_ms: 300,
      worker_queue_capacity: 256,
    }
  }
}

impl SyncConfig {
  pub fn poll_interval(&self) -> Duration {
    Duration::from_secs(self.poll_interval_minutes.max(1) * 60)
  }

  pub fn initial_poll_delay(&self) -> Duration {
    Duration::from_secs(self.initial_poll_delay_secs)
  }

  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }

  pub fn stability_max_wait(&self) -> Duration {
    Duration::from_millis(self.stability_max_wait_ms)
  }

  pub fn stability_poll_interval(&self) -> Duration {
    Duration::from_millis(self.stability_poll_interval_ms)
  }
}

// ============================================================================
// Extraction Configuration
// ============================================================================

/// Limits applied when pulling text out of files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
  /// Files larger than this are indexed with metadata only (default: 10 MiB)
  pub max_file_size: u64,

  /// Extraction timeout in milliseconds (default: 10000)
  pub timeout_ms: u64,

  /// Extensions to index, without the dot. Empty means every regular file.
  pub extensions: Vec<String>,

  /// Upsert metadata with empty content when extraction fails (default: true)
  /// When false, files that yield no text are skipped.
  pub metadata_only_on_failure: bool,
}

impl Default for ExtractConfig {
  fn default() -> Self {
    Self {
      max_file_size: 10 * 1024 * 1024,
      timeout_ms: 10_000,
      extensions: Vec::new(),
      metadata_only_on_failure: true,
    }
  }
}

impl ExtractConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_millis(self.timeout_ms)
  }
}

// ============================================================================
// Daemon Configuration
// ============================================================================

/// Daemon process settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
  /// Log level: "off", "error", "warn", "info", "debug", "trace"
  /// Default: "info"
  #[serde(default = "default_log_level")]
  pub log_level: String,

  /// Log file rotation: "daily", "hourly", "never"
  /// Default: "daily"
  #[serde(default = "default_log_rotation")]
  pub log_rotation: String,
}

fn default_log_level() -> String {
  "info".to_string()
}
fn default_log_rotation() -> String {
  "daily".to_string()
}

impl Default for DaemonConfig {
  fn default() -> Self {
    Self {
      log_level: default_log_level(),
      log_rotation: default_log_rotation(),
    }
  }
}

// ============================================================================
// Root Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
  /// Gitignore-style patterns excluded from every root
  #[serde(default)]
  pub exclude: Vec<String>,

  /// Override for the data directory (snapshots, journal, logs)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data_dir: Option<PathBuf>,

  /// Source roots, in configuration order
  #[serde(default)]
  pub sources: Vec<SourceConfig>,

  #[serde(default)]
  pub sync: SyncConfig,

  #[serde(default)]
  pub extract: ExtractConfig,

  #[serde(default)]
  pub daemon: DaemonConfig,
}

impl Config {
  /// Parse a config from TOML text and validate it
  pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
    let mut config = Self::parse_toml(content, origin)?;
    config.validate()?;
    Ok(config)
  }

  /// Parse a config from TOML text without validating it
  pub fn parse_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
    toml::from_str(content).map_err(|source| ConfigError::Parse {
      path: origin.to_path_buf(),
      source,
    })
  }

  /// Load and validate config from an explicit file
  pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
    let mut config = Self::read_from(path)?;
    config.validate()?;
    Ok(config)
  }

  /// Read config from an explicit file without validating it
  pub fn read_from(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse_toml(&content, path)
  }

  /// Load the explicit config if given, else the user config, else defaults
  pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    let mut config = Self::read(explicit)?;
    config.validate()?;
    Ok(config)
  }

  /// Like `load` but leaves validation to the caller, so its warnings can be
  /// emitted once logging is up
  pub fn read(explicit: Option<&Path>) -> Result<Self, ConfigError> {
    if let Some(path) = explicit {
      return Self::read_from(path);
    }

    match Self::user_config_path() {
      Some(path) if path.exists() => Self::read_from(&path),
      _ => Ok(Self::default()),
    }
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    Some(crate::dirs::default_config_dir().join("config.toml"))
  }

  /// Effective data directory
  pub fn data_dir(&self) -> PathBuf {
    self.data_dir.clone().unwrap_or_else(crate::dirs::default_data_dir)
  }

  /// Normalize values that are out of range and reject unusable sources
  pub fn validate(&mut self) -> Result<(), ConfigError> {
    if self.sync.poll_interval_minutes < 1 {
      warn!(
        configured = self.sync.poll_interval_minutes,
        "poll_interval_minutes must be at least 1, using 1"
      );
      self.sync.poll_interval_minutes = 1;
    }

    if self.sync.worker_queue_capacity == 0 {
      warn!("worker_queue_capacity must be positive, using 1");
      self.sync.worker_queue_capacity = 1;
    }

    if self.sync.stability_poll_interval_ms == 0 {
      self.sync.stability_poll_interval_ms = SyncConfig::default().stability_poll_interval_ms;
    }

    for ext in &mut self.extract.extensions {
      *ext = ext.trim_start_matches('.').to_lowercase();
    }

    if let Some(source) = self.sources.iter().find(|s| !s.path.is_absolute()) {
      return Err(ConfigError::RelativeSource(source.path.clone()));
    }

    Ok(())
  }

  pub fn local_sources(&self) -> impl Iterator<Item = &SourceConfig> {
    self.sources.iter().filter(|s| !s.network)
  }

  pub fn network_sources(&self) -> impl Iterator<Item = &SourceConfig> {
    self.sources.iter().filter(|s| s.network)
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let defaults = Self::default();
    format!(
      r#"# syncdex configuration
# Place in ~/.config/syncdex/config.toml or pass --config <file>

# Gitignore-style patterns that are never indexed
exclude = ["node_modules/", "*.bak"]

# Uncomment to keep snapshots and the journal somewhere else
# data_dir = "/var/lib/syncdex"

# One block per root. Network roots are re-scanned on a timer instead of
# relying on change notifications.
# [[sources]]
# path = "/home/me/Documents"
#
# [[sources]]
# path = "/mnt/share/projects"
# network = true

[sync]
poll_interval_minutes = {poll}
initial_poll_delay_secs = {initial}
debounce_ms = {debounce}
stability_max_wait_ms = {max_wait}
stability_poll_interval_ms = {interval}
worker_queue_capacity = {queue}

[extract]
max_file_size = {max_size}
timeout_ms = {timeout}
# Empty list indexes every regular file
extensions = []
metadata_only_on_failure = true

[daemon]
# off, error, warn, info, debug, trace
log_level = "{level}"
# daily, hourly, never
log_rotation = "{rotation}"
"#,
      poll = defaults.sync.poll_interval_minutes,
      initial = defaults.sync.initial_poll_delay_secs,
      debounce = defaults.sync.debounce_ms,
      max_wait = defaults.sync.stability_max_wait_ms,
      interval = defaults.sync.stability_poll_interval_ms,
      queue = defaults.sync.worker_queue_capacity,
      max_size = defaults.extract.max_file_size,
      timeout = defaults.extract.timeout_ms,
      level = defaults.daemon.log_level,
      rotation = defaults.daemon.log_rotation,
    )
  }
}

//! Configuration loaded from `~/.calnotify/config.toml`.
//!
//! Every section has defaults, so a missing file or a partial file is valid.
//! Selected keys can be overridden from the environment (`CALNOTIFY_*`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CalNotifyError, Result};
use crate::types::Retention;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalNotifyConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Event store selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `memory` or `sqlite`.
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Database file for the sqlite backend. `~` is expanded.
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    #[serde(default)]
    pub retention: Retention,
}

fn default_backend() -> String { "memory".into() }
fn default_db_path() -> String { "~/.calnotify/calendar.db".into() }
fn default_busy_timeout_ms() -> u64 { 5000 }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            retention: Retention::default(),
        }
    }
}

impl StorageConfig {
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Broker address and queue name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_address")]
    pub address: String,
    #[serde(default = "default_queue_name")]
    pub name: String,
}

fn default_queue_address() -> String { "local://calnotify".into() }
fn default_queue_name() -> String { "notifications".into() }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            address: default_queue_address(),
            name: default_queue_name(),
        }
    }
}

/// Scan loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

fn default_interval_secs() -> u64 { 60 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { interval_secs: default_interval_secs() }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Log filter and output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String { "info".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

impl CalNotifyConfig {
    /// Base directory for config and data.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".calnotify")
    }

    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Load from the default path, then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)?
        } else {
            tracing::debug!("Config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Save to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override keys from `lookup` (the process environment in `load_from`).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("CALNOTIFY_STORAGE_BACKEND") {
            self.storage.backend = v;
        }
        if let Some(v) = lookup("CALNOTIFY_STORAGE_PATH") {
            self.storage.path = v;
        }
        if let Some(v) = lookup("CALNOTIFY_QUEUE_ADDRESS") {
            self.queue.address = v;
        }
        if let Some(v) = lookup("CALNOTIFY_QUEUE_NAME") {
            self.queue.name = v;
        }
        if let Some(v) = lookup("CALNOTIFY_SCAN_INTERVAL_SECS").and_then(|s| s.parse().ok()) {
            self.scheduler.interval_secs = v;
        }
        if let Some(v) = lookup("CALNOTIFY_LOG_LEVEL") {
            self.logging.level = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.interval_secs == 0 {
            return Err(CalNotifyError::config("scheduler.interval_secs must be positive"));
        }
        if self.queue.name.trim().is_empty() {
            return Err(CalNotifyError::config("queue.name must not be empty"));
        }
        Ok(())
    }
}

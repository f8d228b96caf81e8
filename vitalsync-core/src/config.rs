//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/vitalsync/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/vitalsync/` (~/.config/vitalsync/)
//! - Data: `$XDG_DATA_HOME/vitalsync/` (~/.local/share/vitalsync/)
//! - State/Logs: `$XDG_STATE_HOME/vitalsync/` (~/.local/state/vitalsync/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Provider API connection
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Sync scheduler behavior
    #[serde(default)]
    pub sync: SyncConfig,

    /// Upstream rate limit budget
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Analytics tunables
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Provider (wearable platform) API configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Base URL of the provider API (e.g., `https://api.example-wearables.com/v3`)
    pub base_url: Option<String>,

    /// HTTP request timeout per endpoint call, in seconds
    #[serde(default = "default_endpoint_timeout")]
    pub endpoint_timeout_secs: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            endpoint_timeout_secs: default_endpoint_timeout(),
        }
    }
}

impl ProviderConfig {
    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        match &self.base_url {
            None => Err(Error::Config(
                "provider.base_url is required to sync".to_string(),
            )),
            Some(url) if url.is_empty() => {
                Err(Error::Config("provider.base_url must not be empty".to_string()))
            }
            Some(_) => Ok(()),
        }
    }
}

fn default_endpoint_timeout() -> u64 {
    10
}

/// Sync scheduler configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// Enable the background scheduler
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minutes between scheduling cycles
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Run a sync cycle immediately on daemon startup
    #[serde(default)]
    pub sync_on_startup: bool,

    /// Maximum users dispatched per cycle
    #[serde(default = "default_max_users_per_run")]
    pub max_users_per_run: usize,

    /// Maximum syncs in flight at once
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_syncs: usize,

    /// Delay between dispatches within a cycle, in milliseconds
    #[serde(default = "default_stagger_ms")]
    pub stagger_ms: u64,

    /// Days of history requested from each endpoint
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            sync_on_startup: false,
            max_users_per_run: default_max_users_per_run(),
            max_concurrent_syncs: default_max_concurrent(),
            stagger_ms: default_stagger_ms(),
            lookback_days: default_lookback_days(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u64 {
    60
}

fn default_max_users_per_run() -> usize {
    25
}

fn default_max_concurrent() -> usize {
    4
}

fn default_stagger_ms() -> u64 {
    2000
}

fn default_lookback_days() -> u32 {
    28
}

/// Per-user dual-window rate limit budget against the provider API
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RateLimitConfig {
    /// Length of the short window in minutes
    #[serde(default = "default_short_window_minutes")]
    pub short_window_minutes: u64,

    /// Calls allowed per user per short window
    #[serde(default = "default_short_window_limit")]
    pub short_window_limit: u32,

    /// Calls allowed per user per 24-hour window
    #[serde(default = "default_long_window_limit")]
    pub long_window_limit: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            short_window_minutes: default_short_window_minutes(),
            short_window_limit: default_short_window_limit(),
            long_window_limit: default_long_window_limit(),
        }
    }
}

fn default_short_window_minutes() -> u64 {
    15
}

fn default_short_window_limit() -> u32 {
    20
}

fn default_long_window_limit() -> u32 {
    100
}

/// Analytics tunables
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct AnalyticsConfig {
    /// Percent deviation of the 7-day mean from the 30-day baseline below
    /// which a trend is classified as stable
    #[serde(default = "default_trend_threshold")]
    pub trend_threshold_percent: f64,

    /// Days of history pulled for baseline computation
    #[serde(default = "default_baseline_window_days")]
    pub baseline_window_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            trend_threshold_percent: default_trend_threshold(),
            baseline_window_days: default_baseline_window_days(),
        }
    }
}

fn default_trend_threshold() -> f64 {
    5.0
}

fn default_baseline_window_days() -> u32 {
    90
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/vitalsync/config.toml`
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("vitalsync").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite database)
    ///
    /// `$XDG_DATA_HOME/vitalsync/`
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("vitalsync")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/vitalsync/`
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("vitalsync")
    }

    /// Returns the database file path
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("vitalsync.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path
    /// behavior before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.provider.base_url.is_none());
        assert_eq!(config.sync.interval_minutes, 60);
        assert_eq!(config.sync.max_users_per_run, 25);
        assert_eq!(config.rate_limit.short_window_minutes, 15);
        assert_eq!(config.rate_limit.short_window_limit, 20);
        assert_eq!(config.rate_limit.long_window_limit, 100);
        assert_eq!(config.analytics.trend_threshold_percent, 5.0);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[provider]
base_url = "https://api.example-wearables.com/v3"
endpoint_timeout_secs = 5

[sync]
interval_minutes = 30
max_users_per_run = 10
stagger_ms = 500

[rate_limit]
short_window_limit = 15
long_window_limit = 100

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(
            config.provider.base_url.as_deref(),
            Some("https://api.example-wearables.com/v3")
        );
        assert_eq!(config.provider.endpoint_timeout_secs, 5);
        assert_eq!(config.sync.interval_minutes, 30);
        assert_eq!(config.sync.max_users_per_run, 10);
        assert_eq!(config.sync.stagger_ms, 500);
        assert_eq!(config.rate_limit.short_window_limit, 15);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_provider_validation() {
        let config = ProviderConfig::default();
        assert!(config.validate().is_err());

        let config = ProviderConfig {
            base_url: Some("https://api.example-wearables.com/v3".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}

//! Client configuration.
//!
//! Stored at `<config_dir>/polislogg/config.json`. Every field has a default,
//! so a missing or partial file is fine. A few settings can be overridden
//! from the environment (see `ENV_*`).

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::EventFilters;
use crate::sync::{SyncConfig, MIN_PERIOD};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "polislogg";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_SHARED_CACHE_URL: &str = "POLISLOGG_SHARED_CACHE_URL";
pub const ENV_API_URL: &str = "POLISLOGG_API_URL";
pub const ENV_CACHE_DIR: &str = "POLISLOGG_CACHE_DIR";

pub const DEFAULT_SHARED_CACHE_URL: &str = "http://127.0.0.1:3000/shared-cache";
pub const DEFAULT_API_URL: &str = "https://polisen.se/api/events";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Full URL of the shared pool endpoint.
    pub shared_cache_url: String,
    /// Upstream police events feed.
    pub api_url: String,
    /// Overrides the platform cache directory.
    pub cache_dir: Option<PathBuf>,
    pub poll_interval_secs: u64,
    pub pull_interval_secs: u64,
    pub push_interval_secs: u64,
    pub startup_delay_secs: u64,
    pub coordination_window_secs: u64,
    pub incremental_push: bool,
    /// Byte limit for the persisted cache; unlimited when unset.
    pub storage_quota_bytes: Option<u64>,
    /// Filters applied to every upstream poll.
    pub filters: EventFilters,
}

impl Default for Config {
    fn default() -> Self {
        let sync = SyncConfig::default();
        Self {
            shared_cache_url: DEFAULT_SHARED_CACHE_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            cache_dir: None,
            poll_interval_secs: 10 * 60,
            pull_interval_secs: sync.pull_interval.as_secs(),
            push_interval_secs: sync.push_interval.as_secs(),
            startup_delay_secs: sync.startup_delay.as_secs(),
            coordination_window_secs: sync.coordination_window.as_secs(),
            incremental_push: sync.incremental_push,
            storage_quota_bytes: None,
            filters: EventFilters::default(),
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Override settings from `lookup` (normally the process environment).
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = get(ENV_SHARED_CACHE_URL) {
            self.shared_cache_url = url;
        }
        if let Some(url) = get(ENV_API_URL) {
            self.api_url = url;
        }
        if let Some(dir) = get(ENV_CACHE_DIR) {
            self.cache_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Intervals below `MIN_PERIOD` (including zero) are raised to it.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs).max(MIN_PERIOD)
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            pull_interval: Duration::from_secs(self.pull_interval_secs).max(MIN_PERIOD),
            push_interval: Duration::from_secs(self.push_interval_secs).max(MIN_PERIOD),
            startup_delay: Duration::from_secs(self.startup_delay_secs),
            coordination_window: Duration::from_secs(self.coordination_window_secs),
            incremental_push: self.incremental_push,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"incremental_push": true, "filters": {"locationName": "Uppsala"}}"#)
                .expect("parse");
        assert!(config.incremental_push);
        assert_eq!(config.filters.location_name.as_deref(), Some("Uppsala"));
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.pull_interval_secs, 300);
        assert_eq!(config.push_interval_secs, 600);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_SHARED_CACHE_URL, "https://pool.example/shared-cache"),
            (ENV_API_URL, "  "),
            (ENV_CACHE_DIR, "/tmp/polislogg-test"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.shared_cache_url, "https://pool.example/shared-cache");
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(
            config.cache_dir().unwrap(),
            PathBuf::from("/tmp/polislogg-test")
        );
    }

    #[test]
    fn test_sync_config_conversion() {
        let config = Config {
            coordination_window_secs: 0,
            ..Config::default()
        };
        let sync = config.sync_config();
        assert_eq!(sync.coordination_window, Duration::ZERO);
        assert_eq!(sync.startup_delay, Duration::from_secs(2));
        assert_eq!(config.poll_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_zero_intervals_are_raised_to_minimum() {
        let config: Config = serde_json::from_str(
            r#"{"poll_interval_secs": 0, "pull_interval_secs": 0, "push_interval_secs": 0}"#,
        )
        .expect("parse");
        let sync = config.sync_config();
        assert_eq!(config.poll_interval(), MIN_PERIOD);
        assert_eq!(sync.pull_interval, MIN_PERIOD);
        assert_eq!(sync.push_interval, MIN_PERIOD);
        assert_eq!(sync.startup_delay, Duration::from_secs(2));
    }
}

//! Configuration system for bitmapist.

use serde::{Deserialize, Serialize};

use crate::error::{BitmapistError, BitmapistResult};
use crate::traits::{StoreConfig, StoreProvider};

/// Default namespace prefix for every key.
pub const DEFAULT_KEY_PREFIX: &str = "bitmapist_";

/// Default expiry (seconds) of derived bitmaps over closed periods.
pub const DEFAULT_FINISHED_OPS_EXPIRE: u64 = 3600 * 24;

/// Default expiry (seconds) of derived bitmaps over open periods.
pub const DEFAULT_UNFINISHED_OPS_EXPIRE: u64 = 60;

/// Main tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Namespace prefix for every key.
    pub key_prefix: String,
    /// Mark hourly bitmaps as well. Hourly tracking multiplies store memory.
    pub track_hourly: bool,
    /// Mark the dateless unique bitmap as well.
    pub track_unique: bool,
    /// Expiry (seconds) of derived bitmaps whose operands are all closed.
    pub finished_ops_expire: u64,
    /// Expiry (seconds) of derived bitmaps with an operand still open.
    pub unfinished_ops_expire: u64,
    /// Keys requested per scan round-trip when enumerating.
    pub scan_batch: usize,
    /// Backing store.
    pub store: StoreConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            track_hourly: false,
            track_unique: true,
            finished_ops_expire: DEFAULT_FINISHED_OPS_EXPIRE,
            unfinished_ops_expire: DEFAULT_UNFINISHED_OPS_EXPIRE,
            scan_batch: 10_000,
            store: StoreConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> BitmapistResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        let config: Self = match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| BitmapistError::Configuration(e.to_string()))?
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| BitmapistError::Configuration(e.to_string()))?,
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| BitmapistError::Configuration(e.to_string()))?,
            _ => {
                return Err(BitmapistError::Configuration(
                    "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
                ))
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads:
    /// - `BITMAPIST_KEY_PREFIX`
    /// - `BITMAPIST_TRACK_HOURLY` / `BITMAPIST_TRACK_UNIQUE` (`true`/`false`)
    /// - `BITMAPIST_FINISHED_OPS_EXPIRE` / `BITMAPIST_UNFINISHED_OPS_EXPIRE` (seconds)
    /// - `BITMAPIST_STORE_PROVIDER` (`memory` or `redis`)
    /// - `BITMAPIST_REDIS_URL`
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(prefix) = std::env::var("BITMAPIST_KEY_PREFIX") {
            config.key_prefix = prefix;
        }
        if let Some(hourly) = env_parse("BITMAPIST_TRACK_HOURLY") {
            config.track_hourly = hourly;
        }
        if let Some(unique) = env_parse("BITMAPIST_TRACK_UNIQUE") {
            config.track_unique = unique;
        }
        if let Some(secs) = env_parse("BITMAPIST_FINISHED_OPS_EXPIRE") {
            config.finished_ops_expire = secs;
        }
        if let Some(secs) = env_parse("BITMAPIST_UNFINISHED_OPS_EXPIRE") {
            config.unfinished_ops_expire = secs;
        }

        if let Ok(provider) = std::env::var("BITMAPIST_STORE_PROVIDER") {
            config.store.provider = match provider.to_lowercase().as_str() {
                "redis" => StoreProvider::Redis,
                _ => StoreProvider::Memory,
            };
        }
        if let Ok(url) = std::env::var("BITMAPIST_REDIS_URL") {
            config.store.url = Some(url);
            if std::env::var("BITMAPIST_STORE_PROVIDER").is_err() {
                config.store.provider = StoreProvider::Redis;
            }
        }

        config
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Check the values a tracker cannot work with.
    pub fn validate(&self) -> BitmapistResult<()> {
        if self.key_prefix.is_empty() {
            return Err(BitmapistError::Configuration(
                "key_prefix must not be empty".to_string(),
            ));
        }
        if self.finished_ops_expire == 0 || self.unfinished_ops_expire == 0 {
            return Err(BitmapistError::Configuration(
                "operation expiries must be at least one second".to_string(),
            ));
        }
        if self.scan_batch == 0 {
            return Err(BitmapistError::Configuration(
                "scan_batch must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// Builder for TrackerConfig.
#[derive(Default)]
pub struct TrackerConfigBuilder {
    config: TrackerConfig,
}

impl TrackerConfigBuilder {
    /// Set the key namespace prefix.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Enable or disable hourly tracking.
    pub fn track_hourly(mut self, enabled: bool) -> Self {
        self.config.track_hourly = enabled;
        self
    }

    /// Enable or disable unique tracking.
    pub fn track_unique(mut self, enabled: bool) -> Self {
        self.config.track_unique = enabled;
        self
    }

    /// Set the expiry of derived bitmaps over closed periods.
    pub fn finished_ops_expire(mut self, seconds: u64) -> Self {
        self.config.finished_ops_expire = seconds;
        self
    }

    /// Set the expiry of derived bitmaps over open periods.
    pub fn unfinished_ops_expire(mut self, seconds: u64) -> Self {
        self.config.unfinished_ops_expire = seconds;
        self
    }

    /// Set the scan batch size.
    pub fn scan_batch(mut self, batch: usize) -> Self {
        self.config.scan_batch = batch;
        self
    }

    /// Set store configuration.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TrackerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = TrackerConfig::default();
        assert_eq!(config.key_prefix, "bitmapist_");
        assert!(!config.track_hourly);
        assert!(config.track_unique);
        assert_eq!(config.finished_ops_expire, 86_400);
        assert_eq!(config.unfinished_ops_expire, 60);
        assert_eq!(config.store.provider, StoreProvider::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = TrackerConfig::builder()
            .key_prefix("stats_")
            .track_hourly(true)
            .finished_ops_expire(10)
            .store(StoreConfig::redis("redis://localhost:6379"))
            .build();
        assert_eq!(config.key_prefix, "stats_");
        assert!(config.track_hourly);
        assert_eq!(config.finished_ops_expire, 10);
        assert_eq!(config.store.provider, StoreProvider::Redis);
    }

    #[test]
    fn test_validate_rejects_zero_expiry() {
        let config = TrackerConfig::builder().unfinished_ops_expire(0).build();
        assert!(matches!(
            config.validate(),
            Err(BitmapistError::Configuration(_))
        ));
        let config = TrackerConfig::builder().key_prefix("").build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "key_prefix = \"app_\"\ntrack_hourly = true\n\n[store]\nprovider = \"redis\"\nurl = \"redis://127.0.0.1:6399\""
        )
        .unwrap();
        let config = TrackerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.key_prefix, "app_");
        assert!(config.track_hourly);
        assert!(config.track_unique);
        assert_eq!(config.store.provider, StoreProvider::Redis);
        assert_eq!(config.store.url.as_deref(), Some("redis://127.0.0.1:6399"));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "unfinished_ops_expire: 30\ntrack_unique: false").unwrap();
        let config = TrackerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.unfinished_ops_expire, 30);
        assert!(!config.track_unique);
    }

    #[test]
    fn test_unsupported_extension() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        assert!(matches!(
            TrackerConfig::from_file(file.path()),
            Err(BitmapistError::Configuration(_))
        ));
    }
}

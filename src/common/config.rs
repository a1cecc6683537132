//! Configuration for shardmesh components

use crate::common::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Node ID (this cluster member's name, e.g. "node1@db1.internal")
    #[serde(default = "default_node")]
    pub node: String,

    /// Shard-map cache config
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_node() -> String {
    "node1@127.0.0.1".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: default_node(),
            cache: CacheConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from `shardmesh.toml` (if present) layered with
    /// `SHARDMESH_*` environment variables. Defaults fill every field
    /// neither source supplies; a source that is present but unparseable
    /// is an error rather than a silent fallback.
    pub fn load() -> Result<Self> {
        config::Config::builder()
            .add_source(config::File::with_name("shardmesh").required(false))
            .add_source(config::Environment::with_prefix("SHARDMESH").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Config>())
            .map_err(|e| Error::InvalidConfig(e.to_string()))
    }
}

/// Shard-map cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Logical name of the shard-configuration feed to subscribe to
    #[serde(default = "default_feed")]
    pub feed: String,

    /// Backoff before reopening a closed or failed subscription
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

fn default_feed() -> String {
    "_dbs".to_string()
}

fn default_retry_interval_ms() -> u64 {
    5_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            feed: default_feed(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

impl CacheConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.feed, "_dbs");
        assert_eq!(config.cache.retry_interval(), Duration::from_secs(5));
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CacheConfig = serde_json::from_str(r#"{"retry_interval_ms": 100}"#).unwrap();
        assert_eq!(config.feed, "_dbs");
        assert_eq!(config.retry_interval(), Duration::from_millis(100));
    }

    // Env mutation and the loads that observe it stay in one test so a
    // parallel test never sees the bad variable.
    #[test]
    fn test_load_layers_env_and_rejects_garbage() {
        let config = Config::load().unwrap();
        assert_eq!(config.cache.feed, "_dbs");

        std::env::set_var("SHARDMESH_CACHE__RETRY_INTERVAL_MS", "not-a-number");
        let err = Config::load().unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
        std::env::remove_var("SHARDMESH_CACHE__RETRY_INTERVAL_MS");

        assert!(Config::load().is_ok());
    }
}

//! Storage tier configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Remote blob network endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Operator switch. `false` makes the health check report unhealthy
    /// without probing, so the cascade starts at the filesystem tier.
    pub enabled: bool,
    /// Base URL accepting `PUT /v1/blobs`.
    pub publisher_url: String,
    /// Base URL serving `GET /v1/blobs/{id}`.
    pub aggregator_url: String,
    /// Path probed on the aggregator by the health check.
    pub health_path: String,
    /// Storage duration requested for each blob.
    pub epochs: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            publisher_url: "https://publisher.walrus-testnet.walrus.space".to_string(),
            aggregator_url: "https://aggregator.walrus-testnet.walrus.space".to_string(),
            health_path: "/v1/api".to_string(),
            epochs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesystemConfig {
    /// Directory reserved for sealed blob files.
    pub root: PathBuf,
}

impl Default for FilesystemConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("sealvault-data/blobs"),
        }
    }
}

/// Default item cap of the fallback cache.
pub const DEFAULT_CACHE_MAX_ITEMS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Oldest items are evicted beyond this many.
    pub max_items: usize,
    /// Payloads larger than this are refused with `QuotaExceeded`.
    pub max_item_bytes: usize,
    /// Key-value file backing the cache and pointer hints. Process-local
    /// when unset.
    pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: DEFAULT_CACHE_MAX_ITEMS,
            max_item_bytes: 5 * 1024 * 1024,
            path: None,
        }
    }
}

/// Per-operation time budgets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub health_check_secs: u64,
    pub store_secs: u64,
    pub retrieve_secs: u64,
}

impl TimeoutConfig {
    pub fn health_check(&self) -> Duration {
        Duration::from_secs(self.health_check_secs)
    }

    pub fn store(&self) -> Duration {
        Duration::from_secs(self.store_secs)
    }

    pub fn retrieve(&self) -> Duration {
        Duration::from_secs(self.retrieve_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            health_check_secs: 5,
            store_secs: 10,
            retrieve_secs: 10,
        }
    }
}

/// Everything needed to assemble the tier cascade.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub remote: RemoteConfig,
    pub filesystem: FilesystemConfig,
    pub cache: CacheConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StorageConfig::default();
        assert!(config.remote.enabled);
        assert_eq!(config.cache.max_items, 100);
        assert_eq!(config.timeouts.health_check(), Duration::from_secs(5));
        assert_eq!(config.timeouts.store(), Duration::from_secs(10));
        assert_eq!(config.timeouts.retrieve(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: StorageConfig =
            serde_json::from_str(r#"{"remote": {"enabled": false}, "cache": {"max_items": 7}}"#)
                .unwrap();

        assert!(!config.remote.enabled);
        assert_eq!(config.remote.epochs, 5);
        assert_eq!(config.cache.max_items, 7);
        assert_eq!(config.timeouts.store_secs, 10);
    }
}

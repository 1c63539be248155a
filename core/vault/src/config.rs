//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use sealvault_common::{Error, Result};
use sealvault_crypto::KdfParams;
use sealvault_storage::StorageConfig;

/// Key-value entry holding the registry's own blob handle.
pub const DEFAULT_POINTER_KEY: &str = "registry:pointer";

/// Blob directory name under a data directory.
pub const BLOBS_DIRNAME: &str = "blobs";

/// Key-value file name under a data directory.
pub const STORE_FILENAME: &str = "store.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Well-known key of the registry pointer in the key-value surface.
    pub pointer_key: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            pointer_key: DEFAULT_POINTER_KEY.to_string(),
        }
    }
}

/// Complete engine configuration.
///
/// Every field has a default, so an empty JSON object is a valid file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(flatten)]
    pub storage: StorageConfig,
    pub registry: RegistryConfig,
    pub kdf: KdfParams,
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    ///
    /// # Errors
    /// - File unreadable
    /// - Invalid JSON or invalid values
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }

    /// Write configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Serialize configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize and validate configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Place blob files and the key-value file under `dir`.
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        self.storage.filesystem.root = dir.join(BLOBS_DIRNAME);
        self.storage.cache.path = Some(dir.join(STORE_FILENAME));
        self
    }

    /// Disable the remote tier.
    pub fn offline(mut self) -> Self {
        self.storage.remote.enabled = false;
        self
    }

    /// Key-value file, if persistence is configured.
    pub fn store_path(&self) -> Option<&PathBuf> {
        self.storage.cache.path.as_ref()
    }

    pub fn validate(&self) -> Result<()> {
        if self.kdf.iterations == 0 {
            return Err(Error::InvalidInput(
                "kdf.iterations must be positive".to_string(),
            ));
        }
        if self.storage.cache.max_items == 0 {
            return Err(Error::InvalidInput(
                "cache.max_items must be positive".to_string(),
            ));
        }
        if self.registry.pointer_key.trim().is_empty() {
            return Err(Error::InvalidInput(
                "registry.pointer_key must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_json_is_default() {
        let config = EngineConfig::from_json("{}").unwrap();

        assert!(config.storage.remote.enabled);
        assert_eq!(config.kdf.iterations, 100_000);
        assert_eq!(config.registry.pointer_key, DEFAULT_POINTER_KEY);
        assert_eq!(config.storage.retry.max_attempts, 3);
        assert!(config.store_path().is_none());
    }

    #[test]
    fn test_storage_sections_are_top_level() {
        let config = EngineConfig::from_json(
            r#"{
                "remote": {"enabled": false},
                "timeouts": {"store_secs": 3},
                "kdf": {"iterations": 5}
            }"#,
        )
        .unwrap();

        assert!(!config.storage.remote.enabled);
        assert_eq!(config.storage.timeouts.store_secs, 3);
        assert_eq!(config.storage.timeouts.retrieve_secs, 10);
        assert_eq!(config.kdf.iterations, 5);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(EngineConfig::from_json(r#"{"kdf": {"iterations": 0}}"#).is_err());
        assert!(EngineConfig::from_json(r#"{"cache": {"max_items": 0}}"#).is_err());
        assert!(EngineConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_data_dir_and_offline() {
        let config = EngineConfig::default().with_data_dir("/srv/vault").offline();

        assert!(!config.storage.remote.enabled);
        assert_eq!(
            config.storage.filesystem.root,
            PathBuf::from("/srv/vault/blobs")
        );
        assert_eq!(
            config.store_path(),
            Some(&PathBuf::from("/srv/vault/store.json"))
        );
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("conf/sealvault.json");
        let config = EngineConfig::default().offline();

        config.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();

        assert!(!loaded.storage.remote.enabled);
        assert_eq!(loaded.kdf, config.kdf);
    }
}

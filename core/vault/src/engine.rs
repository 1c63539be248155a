//! Engine wiring.
//!
//! Construction is two-phase: the tiered store is built from static
//! configuration first, then the registry and manager are layered on top.
//! The registry blob itself is only created on first use.

use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::manager::VaultManager;
use crate::registry::Registry;
use sealvault_common::Result;
use sealvault_crypto::Sealer;
use sealvault_storage::{FileKv, KeyValueStore, MemoryKv, TieredStore};

/// A fully wired vault engine.
pub struct VaultEngine {
    store: Arc<TieredStore>,
    registry: Arc<Registry>,
    manager: VaultManager,
}

impl VaultEngine {
    /// Build every component from configuration.
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Key-value file unreadable
    /// - Filesystem tier root cannot be created
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;

        let kv: Arc<dyn KeyValueStore> = match config.store_path() {
            Some(path) => Arc::new(FileKv::open(path)?),
            None => Arc::new(MemoryKv::new()),
        };

        let sealer = Sealer::new(config.kdf);
        let store = Arc::new(TieredStore::from_config(&config.storage, kv.clone(), sealer)?);
        let registry = Arc::new(Registry::new(
            store.clone(),
            kv.clone(),
            config.registry.pointer_key.clone(),
        ));
        let manager = VaultManager::new(store.clone(), registry.clone(), kv);

        info!(
            tiers = ?store.tiers(),
            persistent = config.store_path().is_some(),
            "Vault engine ready"
        );

        Ok(Self {
            store,
            registry,
            manager,
        })
    }

    pub fn manager(&self) -> &VaultManager {
        &self.manager
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn store(&self) -> &TieredStore {
        &self.store
    }
}

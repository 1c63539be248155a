//! User registry: maps each user to the handle of their current vault blob.
//!
//! The registry is itself a blob stored through the same [`TieredStore`] it
//! serves. Its handle lives under a well-known key in the key-value surface;
//! when that key is absent an empty registry is written on first use. Every
//! change writes a new registry blob and moves the pointer, so older registry
//! blobs stay behind as orphans.
//!
//! The pointer only ever names a durable tier. A registry blob that landed on
//! the memory tier is kept in process memory instead and the last durable
//! pointer is left in place, so a restart never finds a pointer to nothing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use sealvault_common::{BlobHandle, BlobKind, Error, Result, Tier, UserId};
use sealvault_storage::{KeyValueStore, TieredStore};

/// How the user authenticated when the entry was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    ZkLogin,
    Password,
    Wallet,
    Other(String),
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthType::ZkLogin => write!(f, "zklogin"),
            AuthType::Password => write!(f, "password"),
            AuthType::Wallet => write!(f, "wallet"),
            AuthType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// One user's pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub user_id: UserId,
    pub blob_id: String,
    pub tier: Tier,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub auth_type: AuthType,
}

impl RegistryEntry {
    pub fn handle(&self) -> BlobHandle {
        BlobHandle::new(self.blob_id.clone(), self.tier)
    }
}

/// Persisted registry document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RegistryDocument {
    users: BTreeMap<String, RegistryEntry>,
}

/// Injectable registry over a tiered store.
pub struct Registry {
    store: Arc<TieredStore>,
    kv: Arc<dyn KeyValueStore>,
    pointer_key: String,
    /// Registry document written since the last durable save, if any.
    volatile: Mutex<Option<RegistryDocument>>,
}

impl Registry {
    pub fn new(
        store: Arc<TieredStore>,
        kv: Arc<dyn KeyValueStore>,
        pointer_key: impl Into<String>,
    ) -> Self {
        Self {
            store,
            kv,
            pointer_key: pointer_key.into(),
            volatile: Mutex::new(None),
        }
    }

    /// Point `user` at `handle`, replacing any previous pointer.
    ///
    /// The original `created_at` of an existing entry is kept.
    pub async fn register(
        &self,
        user: &UserId,
        handle: &BlobHandle,
        auth_type: AuthType,
    ) -> Result<RegistryEntry> {
        let mut doc = self.load().await?;
        let now = Utc::now();

        let created_at = doc
            .users
            .get(user.as_str())
            .map(|e| e.created_at)
            .unwrap_or(now);

        let entry = RegistryEntry {
            user_id: user.clone(),
            blob_id: handle.id.clone(),
            tier: handle.tier,
            created_at,
            last_accessed_at: now,
            auth_type,
        };
        doc.users.insert(user.as_str().to_string(), entry.clone());
        self.save(&doc).await?;

        info!(user_id = %user, tier = %handle.tier, "Registered vault pointer");
        Ok(entry)
    }

    /// Resolve the user's current vault handle.
    ///
    /// A hit refreshes `last_accessed_at` and persists the registry.
    pub async fn lookup(&self, user: &UserId) -> Result<Option<BlobHandle>> {
        let mut doc = self.load().await?;

        let Some(entry) = doc.users.get_mut(user.as_str()) else {
            debug!(user_id = %user, "Registry miss");
            return Ok(None);
        };

        entry.last_accessed_at = Utc::now();
        let handle = entry.handle();
        self.save(&doc).await?;

        Ok(Some(handle))
    }

    /// Like [`lookup`](Self::lookup), but a miss is an error.
    pub async fn require(&self, user: &UserId) -> Result<BlobHandle> {
        self.lookup(user)
            .await?
            .ok_or_else(|| Error::RegistryMiss(user.to_string()))
    }

    /// Drop the user's pointer. The vault blob itself is left in place.
    ///
    /// Pointer hints kept by a [`VaultManager`](crate::VaultManager) are not
    /// touched; use [`VaultManager::forget_user`](crate::VaultManager::forget_user)
    /// to drop both.
    ///
    /// Returns whether an entry existed.
    pub async fn remove(&self, user: &UserId) -> Result<bool> {
        let mut doc = self.load().await?;
        if doc.users.remove(user.as_str()).is_none() {
            return Ok(false);
        }
        self.save(&doc).await?;
        info!(user_id = %user, "Removed vault pointer");
        Ok(true)
    }

    /// Entry for `user` without touching `last_accessed_at`.
    pub async fn entry(&self, user: &UserId) -> Result<Option<RegistryEntry>> {
        let doc = self.load().await?;
        Ok(doc.users.get(user.as_str()).cloned())
    }

    /// Registered users, sorted.
    pub async fn list_users(&self) -> Result<Vec<UserId>> {
        let doc = self.load().await?;
        Ok(doc.users.values().map(|e| e.user_id.clone()).collect())
    }

    fn pointer(&self) -> Result<Option<BlobHandle>> {
        match self.kv.get(&self.pointer_key)? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn load(&self) -> Result<RegistryDocument> {
        if let Some(doc) = self.volatile_doc() {
            return Ok(doc);
        }

        let Some(handle) = self.pointer()? else {
            info!(key = %self.pointer_key, "Creating empty registry");
            return self.bootstrap().await;
        };

        match self.store.retrieve_string(&handle).await {
            Ok(json) => Ok(serde_json::from_str(&json)?),
            Err(err) if !handle.tier.is_durable() => {
                warn!(
                    handle = %handle,
                    error = %err,
                    "Registry pointer names a lost volatile blob, starting empty"
                );
                self.bootstrap().await
            }
            Err(err) => Err(err),
        }
    }

    async fn bootstrap(&self) -> Result<RegistryDocument> {
        let doc = RegistryDocument::default();
        self.save(&doc).await?;
        Ok(doc)
    }

    async fn save(&self, doc: &RegistryDocument) -> Result<()> {
        let json = serde_json::to_string(doc)?;
        let handle = self.store.store_string(&json, BlobKind::Registry).await?;

        if handle.tier.is_durable() {
            self.kv.set(&self.pointer_key, &serde_json::to_string(&handle)?)?;
            self.set_volatile(None);
            debug!(handle = %handle, users = doc.users.len(), "Registry persisted");
        } else {
            warn!(
                handle = %handle,
                users = doc.users.len(),
                "Registry held in memory only, durable pointer unchanged"
            );
            self.set_volatile(Some(doc.clone()));
        }
        Ok(())
    }

    fn volatile_doc(&self) -> Option<RegistryDocument> {
        self.volatile
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_volatile(&self, doc: Option<RegistryDocument>) {
        *self.volatile.lock().unwrap_or_else(|e| e.into_inner()) = doc;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sealvault_crypto::{KdfParams, Sealer};
    use sealvault_storage::{FilesystemBackend, MemoryBackend, MemoryKv, RetryConfig};
    use std::path::Path;
    use tempfile::TempDir;

    fn sealer() -> Sealer {
        Sealer::new(KdfParams::with_iterations(10))
    }

    /// Filesystem tier at `root`, memory tier behind it.
    fn store_at(root: &Path) -> Arc<TieredStore> {
        Arc::new(
            TieredStore::new(sealer())
                .with_tier(Arc::new(FilesystemBackend::new(root).unwrap()))
                .with_tier(Arc::new(MemoryBackend::new()))
                .with_retry(RetryConfig::new(1)),
        )
    }

    /// A store whose filesystem tier rejects every write.
    fn store_with_broken_filesystem(temp: &TempDir) -> Arc<TieredStore> {
        let root = temp.path().join("broken");
        let store = store_at(&root);
        std::fs::remove_dir_all(&root).unwrap();
        std::fs::write(&root, b"").unwrap();
        store
    }

    fn registry() -> (Registry, Arc<MemoryKv>, TempDir) {
        let temp = TempDir::new().unwrap();
        let kv = Arc::new(MemoryKv::new());
        (
            Registry::new(store_at(temp.path()), kv.clone(), "registry:pointer"),
            kv,
            temp,
        )
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_bootstraps_empty_registry() {
        let (registry, kv, _temp) = registry();
        assert!(kv.get("registry:pointer").unwrap().is_none());

        assert_eq!(registry.lookup(&user("u1")).await.unwrap(), None);
        assert!(kv.get("registry:pointer").unwrap().is_some());
        assert!(registry.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let (registry, _, _temp) = registry();
        let handle = BlobHandle::new("mem_1", Tier::Memory);

        registry
            .register(&user("u1"), &handle, AuthType::Password)
            .await
            .unwrap();

        assert_eq!(registry.lookup(&user("u1")).await.unwrap(), Some(handle));
    }

    #[tokio::test]
    async fn test_register_overwrites_pointer() {
        let (registry, _, _temp) = registry();
        let first = BlobHandle::new("fs_a", Tier::Filesystem);
        let second = BlobHandle::new("fs_b", Tier::Filesystem);

        let original = registry
            .register(&user("u1"), &first, AuthType::ZkLogin)
            .await
            .unwrap();
        let updated = registry
            .register(&user("u1"), &second, AuthType::ZkLogin)
            .await
            .unwrap();

        assert_eq!(updated.created_at, original.created_at);
        assert_eq!(registry.lookup(&user("u1")).await.unwrap(), Some(second));
        assert_eq!(registry.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_lookup_updates_last_accessed() {
        let (registry, _, _temp) = registry();
        let handle = BlobHandle::new("mem_1", Tier::Memory);
        let registered = registry
            .register(&user("u1"), &handle, AuthType::Wallet)
            .await
            .unwrap();

        registry.lookup(&user("u1")).await.unwrap();
        let entry = registry.entry(&user("u1")).await.unwrap().unwrap();

        assert!(entry.last_accessed_at >= registered.last_accessed_at);
        assert_eq!(entry.auth_type, AuthType::Wallet);
    }

    #[tokio::test]
    async fn test_remove() {
        let (registry, _, _temp) = registry();
        let handle = BlobHandle::new("mem_1", Tier::Memory);
        registry
            .register(&user("u1"), &handle, AuthType::Password)
            .await
            .unwrap();

        assert!(registry.remove(&user("u1")).await.unwrap());
        assert!(!registry.remove(&user("u1")).await.unwrap());
        assert!(matches!(
            registry.require(&user("u1")).await,
            Err(Error::RegistryMiss(_))
        ));
    }

    #[tokio::test]
    async fn test_shared_pointer_survives_new_instance() {
        let temp = TempDir::new().unwrap();
        let store = store_at(temp.path());
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let handle = BlobHandle::new("mem_9", Tier::Memory);

        Registry::new(store.clone(), kv.clone(), "registry:pointer")
            .register(&user("u2"), &handle, AuthType::Other("passkey".into()))
            .await
            .unwrap();

        let reopened = Registry::new(store, kv, "registry:pointer");
        assert_eq!(reopened.lookup(&user("u2")).await.unwrap(), Some(handle));
    }

    #[tokio::test]
    async fn test_memory_tier_registry_is_never_pointed_at() {
        let temp = TempDir::new().unwrap();
        let kv = Arc::new(MemoryKv::new());
        let registry = Registry::new(
            store_with_broken_filesystem(&temp),
            kv.clone(),
            "registry:pointer",
        );
        let handle = BlobHandle::new("mem_1", Tier::Memory);

        registry
            .register(&user("u1"), &handle, AuthType::Password)
            .await
            .unwrap();

        // Still served within the process, but never persisted as the pointer.
        assert_eq!(registry.lookup(&user("u1")).await.unwrap(), Some(handle));
        assert!(kv.get("registry:pointer").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restart_after_memory_only_registry() {
        let temp = TempDir::new().unwrap();
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let handle = BlobHandle::new("mem_1", Tier::Memory);

        Registry::new(
            store_with_broken_filesystem(&temp),
            kv.clone(),
            "registry:pointer",
        )
        .register(&user("u1"), &handle, AuthType::Password)
        .await
        .unwrap();

        // Fresh process: new memory tier, filesystem back up.
        let restarted = Registry::new(
            store_at(&temp.path().join("recovered")),
            kv.clone(),
            "registry:pointer",
        );
        assert_eq!(restarted.lookup(&user("u2")).await.unwrap(), None);

        let fresh = BlobHandle::new("fs_u2", Tier::Filesystem);
        restarted
            .register(&user("u2"), &fresh, AuthType::Password)
            .await
            .unwrap();
        assert_eq!(restarted.lookup(&user("u2")).await.unwrap(), Some(fresh));
        assert!(kv.get("registry:pointer").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_lost_volatile_pointer_starts_empty() {
        let (registry, kv, _temp) = registry();
        let gone = BlobHandle::new("mem_gone", Tier::Memory);
        kv.set("registry:pointer", &serde_json::to_string(&gone).unwrap())
            .unwrap();

        assert_eq!(registry.lookup(&user("u1")).await.unwrap(), None);

        let pointer: BlobHandle =
            serde_json::from_str(&kv.get("registry:pointer").unwrap().unwrap()).unwrap();
        assert_eq!(pointer.tier, Tier::Filesystem);
    }

    #[tokio::test]
    async fn test_lost_durable_pointer_is_an_error() {
        let (registry, kv, _temp) = registry();
        let gone = BlobHandle::new("registry_gone", Tier::Filesystem);
        kv.set("registry:pointer", &serde_json::to_string(&gone).unwrap())
            .unwrap();

        assert!(matches!(
            registry.lookup(&user("u1")).await,
            Err(Error::AllTiersExhausted(_))
        ));
    }
}

//! Vault manager: user-facing vault operations.
//!
//! Every mutation is a full cycle:
//!
//! ```text
//! registry lookup -> retrieve -> unseal -> mutate -> touch metadata
//!     -> seal -> store -> registry register -> pointer hint
//! ```
//!
//! Each write produces a new blob; the registry pointer is the only mutable
//! cell. Two concurrent mutations for one user race and the last register
//! wins. Callers that need more must serialize per user.

use std::sync::Arc;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::model::{
    EntryPatch, IntegrityReport, NewEntry, SearchQuery, VaultData, VaultEntry, VaultExport,
    VaultStats,
};
use crate::registry::{AuthType, Registry};
use sealvault_common::{BlobHandle, BlobKind, Error, Result, UserId};
use sealvault_storage::{KeyValueStore, TieredStore};

/// Key-value prefix of per-user pointer hints.
pub const HINT_PREFIX: &str = "vault_hint:";

fn hint_key(user: &UserId) -> String {
    format!("{}{}", HINT_PREFIX, user)
}

/// Vault operations over a tiered store and a registry.
pub struct VaultManager {
    store: Arc<TieredStore>,
    registry: Arc<Registry>,
    hints: Arc<dyn KeyValueStore>,
    auth_type: AuthType,
}

impl VaultManager {
    pub fn new(
        store: Arc<TieredStore>,
        registry: Arc<Registry>,
        hints: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self {
            store,
            registry,
            hints,
            auth_type: AuthType::Password,
        }
    }

    /// Auth type recorded in registry entries written by this manager.
    pub fn with_auth_type(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Create an empty vault for `user`.
    ///
    /// An existing vault is not merged: the registry pointer moves to the
    /// new, empty vault and the old blob is orphaned.
    pub async fn create_vault(&self, user: &UserId, secret: &str) -> Result<VaultData> {
        let mut data = VaultData::empty(user.clone());
        let handle = self.write(user, secret, &mut data).await?;
        info!(user_id = %user, tier = %handle.tier, "Vault created");
        Ok(data)
    }

    /// Drop the user's registry entry and pointer hint.
    ///
    /// The vault blob stays in storage but can no longer be reached through
    /// this manager. Returns whether a registry entry existed.
    pub async fn forget_user(&self, user: &UserId) -> Result<bool> {
        let existed = self.registry.remove(user).await?;
        self.hints.remove(&hint_key(user))?;
        info!(user_id = %user, existed, "User forgotten");
        Ok(existed)
    }

    /// Add an entry and return it with its assigned id.
    ///
    /// # Errors
    /// - `RegistryMiss` if the user has no vault
    pub async fn add_entry(
        &self,
        user: &UserId,
        secret: &str,
        entry: NewEntry,
    ) -> Result<VaultEntry> {
        let mut data = self.read_for_update(user, secret).await?;
        let added = data.add(entry).clone();
        self.write(user, secret, &mut data).await?;
        debug!(user_id = %user, entry_id = %added.id, "Entry added");
        Ok(added)
    }

    /// Apply `patch` to one entry.
    ///
    /// # Errors
    /// - `RegistryMiss` if the user has no vault
    /// - `EntryNotFound` if `entry_id` is absent
    pub async fn update_entry(
        &self,
        user: &UserId,
        secret: &str,
        entry_id: &str,
        patch: EntryPatch,
    ) -> Result<VaultEntry> {
        let mut data = self.read_for_update(user, secret).await?;
        let updated = data
            .update(entry_id, patch)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        self.write(user, secret, &mut data).await?;
        debug!(user_id = %user, entry_id = %entry_id, "Entry updated");
        Ok(updated)
    }

    /// Remove one entry.
    ///
    /// # Errors
    /// - `RegistryMiss` if the user has no vault
    /// - `EntryNotFound` if `entry_id` is absent
    pub async fn remove_entry(&self, user: &UserId, secret: &str, entry_id: &str) -> Result<()> {
        let mut data = self.read_for_update(user, secret).await?;
        data.remove(entry_id)
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))?;
        self.write(user, secret, &mut data).await?;
        debug!(user_id = %user, entry_id = %entry_id, "Entry removed");
        Ok(())
    }

    /// Read-only fetch of the whole vault.
    pub async fn get_vault(&self, user: &UserId, secret: &str) -> Result<VaultData> {
        let plaintext = self.read(user, secret).await?;
        VaultData::from_json(&plaintext)
    }

    pub async fn get_entry(
        &self,
        user: &UserId,
        secret: &str,
        entry_id: &str,
    ) -> Result<VaultEntry> {
        let data = self.get_vault(user, secret).await?;
        data.entry(entry_id)
            .cloned()
            .ok_or_else(|| Error::EntryNotFound(entry_id.to_string()))
    }

    pub async fn search_entries(
        &self,
        user: &UserId,
        secret: &str,
        query: &SearchQuery,
    ) -> Result<Vec<VaultEntry>> {
        Ok(self.get_vault(user, secret).await?.search(query))
    }

    pub async fn get_stats(&self, user: &UserId, secret: &str) -> Result<VaultStats> {
        Ok(self.get_vault(user, secret).await?.stats())
    }

    pub async fn export_vault(
        &self,
        user: &UserId,
        secret: &str,
        include_passwords: bool,
    ) -> Result<VaultExport> {
        let export = self.get_vault(user, secret).await?.export(include_passwords);
        info!(user_id = %user, include_passwords, "Vault exported");
        Ok(export)
    }

    /// Check the stored vault for inconsistencies.
    ///
    /// Storage, registry and decryption errors still fail; anything wrong with
    /// the decrypted contents is reported instead.
    pub async fn validate_integrity(&self, user: &UserId, secret: &str) -> Result<IntegrityReport> {
        let plaintext = self.read(user, secret).await?;

        let data = match VaultData::from_json(&plaintext) {
            Ok(data) => data,
            Err(err) => {
                return Ok(IntegrityReport {
                    is_valid: false,
                    issues: vec![format!("vault contents unreadable: {}", err)],
                })
            }
        };

        let mut report = data.check_integrity();
        if data.metadata.user_id != *user {
            report.is_valid = false;
            report.issues.push(format!(
                "vault belongs to {}, not {}",
                data.metadata.user_id, user
            ));
        }
        if !report.is_valid {
            warn!(user_id = %user, issues = report.issues.len(), "Vault integrity issues found");
        }
        Ok(report)
    }

    /// Current pointer hint, if one is recorded and parses.
    pub fn hint(&self, user: &UserId) -> Option<BlobHandle> {
        let json = self.hints.get(&hint_key(user)).ok().flatten()?;
        serde_json::from_str(&json).ok()
    }

    /// Decrypted vault JSON. Resolves through the pointer hint first.
    async fn read(&self, user: &UserId, secret: &str) -> Result<Zeroizing<Vec<u8>>> {
        if let Some(handle) = self.hint(user) {
            match self.store.retrieve_string(&handle).await {
                Ok(sealed) => return self.unseal(&sealed, secret),
                Err(err) => {
                    debug!(
                        user_id = %user,
                        error = %err,
                        "Hinted vault unavailable, asking registry"
                    );
                }
            }
        }

        let handle = self.registry.require(user).await?;
        let sealed = self.store.retrieve_string(&handle).await?;
        self.unseal(&sealed, secret)
    }

    /// Current vault for a mutation. Always resolves through the registry.
    async fn read_for_update(&self, user: &UserId, secret: &str) -> Result<VaultData> {
        let handle = self.registry.require(user).await?;
        let sealed = self.store.retrieve_string(&handle).await?;
        let plaintext = self.unseal(&sealed, secret)?;
        VaultData::from_json(&plaintext)
    }

    fn unseal(&self, sealed: &str, secret: &str) -> Result<Zeroizing<Vec<u8>>> {
        let plaintext = self.store.sealer().unseal_str(sealed, secret.as_bytes())?;
        Ok(Zeroizing::new(plaintext))
    }

    async fn write(&self, user: &UserId, secret: &str, data: &mut VaultData) -> Result<BlobHandle> {
        data.touch();
        let plaintext = Zeroizing::new(data.to_json()?);
        let sealed = self
            .store
            .sealer()
            .seal_to_string(&plaintext, secret.as_bytes())?;

        let handle = self.store.store_string(&sealed, BlobKind::Vault).await?;
        self.registry
            .register(user, &handle, self.auth_type.clone())
            .await?;

        // The registry is authoritative; a lost hint only costs a lookup.
        let hint = serde_json::to_string(&handle)?;
        if let Err(err) = self.hints.set(&hint_key(user), &hint) {
            warn!(user_id = %user, error = %err, "Failed to record vault hint");
        }

        Ok(handle)
    }
}

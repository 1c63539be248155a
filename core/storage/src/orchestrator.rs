//! Tiered storage orchestrator.
//!
//! Each operation walks an ordered list of backends:
//!
//! ```text
//! HealthCheck -> { healthy: try remote | unhealthy: skip remote }
//! TryTier(n)  -> { success: done | failure/timeout: TryTier(n + 1) }
//! no tiers left -> AllTiersExhausted
//! ```
//!
//! Within a tier every attempt runs under a timeout and transient failures
//! are retried with linear backoff. Tier errors are logged and folded into
//! the aggregate error; they never reach the caller on their own. A timed
//! out attempt is dropped, not awaited.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::backend::BlobBackend;
use crate::cache::LocalCacheBackend;
use crate::config::{StorageConfig, TimeoutConfig};
use crate::filesystem::FilesystemBackend;
use crate::kv::KeyValueStore;
use crate::memory::MemoryBackend;
use crate::remote::RemoteBackend;
use crate::retry::{RetryConfig, RetryExecutor};
use sealvault_common::{BlobHandle, BlobKind, Error, Result, Tier, TierFailure};
use sealvault_crypto::Sealer;

/// Reachability of one tier, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStatus {
    pub tier: Tier,
    pub name: String,
    pub reachable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreStatus {
    pub remote_enabled: bool,
    pub healthy: bool,
    pub tiers: Vec<TierStatus>,
}

/// Storage front door used by the registry and the vault manager.
pub struct TieredStore {
    tiers: Vec<Arc<dyn BlobBackend>>,
    cache: Option<Arc<LocalCacheBackend>>,
    remote_enabled: bool,
    timeouts: TimeoutConfig,
    retry: RetryExecutor,
    sealer: Sealer,
}

impl TieredStore {
    /// Create an orchestrator with no tiers.
    ///
    /// Tiers are tried in the order they are added.
    pub fn new(sealer: Sealer) -> Self {
        Self {
            tiers: Vec::new(),
            cache: None,
            remote_enabled: true,
            timeouts: TimeoutConfig::default(),
            retry: RetryExecutor::default(),
            sealer,
        }
    }

    /// Assemble the standard four-tier cascade.
    ///
    /// # Errors
    /// - Remote URLs invalid
    /// - Filesystem root cannot be created
    /// - Stored cache document corrupt
    pub fn from_config(
        config: &StorageConfig,
        kv: Arc<dyn KeyValueStore>,
        sealer: Sealer,
    ) -> Result<Self> {
        let cache = Arc::new(LocalCacheBackend::open(kv, sealer, config.cache.clone())?);

        let store = Self::new(sealer)
            .with_tier(Arc::new(RemoteBackend::new(&config.remote)?))
            .with_tier(Arc::new(FilesystemBackend::new(&config.filesystem.root)?))
            .with_cache(cache)
            .with_tier(Arc::new(MemoryBackend::new()))
            .with_remote_enabled(config.remote.enabled)
            .with_timeouts(config.timeouts.clone())
            .with_retry(config.retry.clone());

        info!(
            remote_enabled = config.remote.enabled,
            root = %config.filesystem.root.display(),
            "Storage tiers configured"
        );
        Ok(store)
    }

    /// Same cascade without a remote tier or filesystem, for isolated use.
    pub fn offline(
        root: impl AsRef<Path>,
        kv: Arc<dyn KeyValueStore>,
        sealer: Sealer,
    ) -> Result<Self> {
        let cache = Arc::new(LocalCacheBackend::open(kv, sealer, Default::default())?);
        Ok(Self::new(sealer)
            .with_tier(Arc::new(FilesystemBackend::new(root)?))
            .with_cache(cache)
            .with_tier(Arc::new(MemoryBackend::new()))
            .with_remote_enabled(false))
    }

    pub fn with_tier(mut self, backend: Arc<dyn BlobBackend>) -> Self {
        self.tiers.push(backend);
        self
    }

    /// Add the local cache tier, keeping a typed handle for cache maintenance.
    pub fn with_cache(mut self, cache: Arc<LocalCacheBackend>) -> Self {
        self.tiers.push(cache.clone());
        self.cache = Some(cache);
        self
    }

    /// Operator flag. When off, the remote tier is never probed or used.
    pub fn with_remote_enabled(mut self, enabled: bool) -> Self {
        self.remote_enabled = enabled;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = RetryExecutor::new(config);
        self
    }

    pub fn sealer(&self) -> &Sealer {
        &self.sealer
    }

    /// The local cache tier, if configured.
    pub fn cache(&self) -> Option<&LocalCacheBackend> {
        self.cache.as_deref()
    }

    /// Tiers in cascade order.
    pub fn tiers(&self) -> Vec<Tier> {
        self.tiers.iter().map(|b| b.tier()).collect()
    }

    /// Probe the remote tier within the health-check budget.
    pub async fn health_check(&self) -> bool {
        if !self.remote_enabled {
            debug!("Remote storage disabled by configuration");
            return false;
        }

        let Some(remote) = self.tiers.iter().find(|b| b.tier() == Tier::Remote) else {
            return false;
        };

        match timeout(self.timeouts.health_check(), remote.health_check()).await {
            Ok(healthy) => healthy,
            Err(_) => {
                warn!(timeout = ?self.timeouts.health_check(), "Remote health check timed out");
                false
            }
        }
    }

    /// Per-tier reachability snapshot.
    pub async fn status(&self) -> StoreStatus {
        let healthy = self.health_check().await;
        let mut tiers = Vec::with_capacity(self.tiers.len());

        for backend in &self.tiers {
            let reachable = if backend.tier() == Tier::Remote {
                healthy
            } else {
                timeout(self.timeouts.health_check(), backend.health_check())
                    .await
                    .unwrap_or(false)
            };
            tiers.push(TierStatus {
                tier: backend.tier(),
                name: backend.name().to_string(),
                reachable,
            });
        }

        StoreStatus {
            remote_enabled: self.remote_enabled,
            healthy,
            tiers,
        }
    }

    /// Run one operation against one tier: timeout per attempt, bounded retries.
    async fn run_on_tier<T, F, Fut>(&self, tier: Tier, limit: Duration, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry
            .execute(move || {
                let attempt = operation();
                async move {
                    match timeout(limit, attempt).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::Timeout(format!(
                            "{} tier did not answer within {:?}",
                            tier, limit
                        ))),
                    }
                }
            })
            .await
    }

    /// Backends to try, with `first` (if any) moved to the front.
    fn plan(&self, first: Option<Tier>) -> Vec<&Arc<dyn BlobBackend>> {
        let mut plan: Vec<&Arc<dyn BlobBackend>> = self.tiers.iter().collect();
        if let Some(first) = first {
            plan.sort_by_key(|b| b.tier() != first);
        }
        plan
    }

    /// Whether the remote tier may be used, probing at most once per operation.
    async fn remote_usable(&self, cached: &mut Option<bool>) -> bool {
        if let Some(healthy) = *cached {
            return healthy;
        }
        let healthy = self.health_check().await;
        if !healthy {
            info!("Remote tier unhealthy, falling back");
        }
        *cached = Some(healthy);
        healthy
    }

    /// Store raw bytes on the first tier that accepts them.
    pub async fn store_bytes(&self, data: &[u8], kind: BlobKind) -> Result<BlobHandle> {
        let mut failures = Vec::new();
        let mut healthy = None;

        for backend in self.plan(None) {
            let tier = backend.tier();
            if tier == Tier::Remote && !self.remote_usable(&mut healthy).await {
                failures.push(TierFailure::new(tier, "skipped: health check failed"));
                continue;
            }

            let result = self
                .run_on_tier(tier, self.timeouts.store(), || backend.put(data, kind))
                .await;

            match result {
                Ok(id) => {
                    if !failures.is_empty() {
                        info!(tier = %tier, kind = %kind, "Stored blob on fallback tier");
                    }
                    if !tier.is_durable() {
                        warn!(
                            kind = %kind,
                            "Blob stored in memory only; it will not survive a restart"
                        );
                    }
                    debug!(tier = %tier, id = %id, "Blob stored");
                    return Ok(BlobHandle::new(id, tier));
                }
                Err(err) => {
                    warn!(tier = %tier, error = %err, "Store failed, advancing to next tier");
                    failures.push(TierFailure::new(tier, err.to_string()));
                }
            }
        }

        error!(kind = %kind, attempts = failures.len(), "Every storage tier failed to store blob");
        Err(Error::AllTiersExhausted(failures))
    }

    /// Fetch raw bytes, trying the handle's own tier first.
    pub async fn retrieve_bytes(&self, handle: &BlobHandle) -> Result<Vec<u8>> {
        let mut failures = Vec::new();
        let mut healthy = None;

        for backend in self.plan(Some(handle.tier)) {
            let tier = backend.tier();
            if tier == Tier::Remote && !self.remote_usable(&mut healthy).await {
                failures.push(TierFailure::new(tier, "skipped: health check failed"));
                continue;
            }

            let id = handle.id.as_str();
            let result = self
                .run_on_tier(tier, self.timeouts.retrieve(), || backend.get(id))
                .await;

            match result {
                Ok(data) => {
                    if tier != handle.tier {
                        info!(
                            tier = %tier,
                            stored_on = %handle.tier,
                            "Blob served by another tier"
                        );
                    }
                    return Ok(data);
                }
                Err(err) => {
                    if tier == handle.tier {
                        warn!(
                            tier = %tier,
                            error = %err,
                            "Retrieve failed, advancing to next tier"
                        );
                    } else {
                        debug!(tier = %tier, error = %err, "Blob not on this tier");
                    }
                    failures.push(TierFailure::new(tier, err.to_string()));
                }
            }
        }

        error!(handle = %handle, "Every storage tier failed to retrieve blob");
        Err(Error::AllTiersExhausted(failures))
    }

    /// Store UTF-8 text (typically base64 sealed blobs or registry JSON).
    pub async fn store_string(&self, text: &str, kind: BlobKind) -> Result<BlobHandle> {
        self.store_bytes(text.as_bytes(), kind).await
    }

    pub async fn retrieve_string(&self, handle: &BlobHandle) -> Result<String> {
        let bytes = self.retrieve_bytes(handle).await?;
        String::from_utf8(bytes)
            .map_err(|e| Error::Serialization(format!("Blob is not UTF-8 text: {}", e)))
    }

    /// Seal a serializable account record and store it.
    pub async fn store_account<T: Serialize>(
        &self,
        account: &T,
        secret: &str,
    ) -> Result<BlobHandle> {
        let json = serde_json::to_vec(account)?;
        let sealed = self.sealer.seal_to_string(&json, secret.as_bytes())?;
        self.store_string(&sealed, BlobKind::Account).await
    }

    /// Retrieve and unseal an account record.
    ///
    /// # Errors
    /// - `FormatInvalid` / `DecryptionFailed` propagate immediately
    pub async fn retrieve_account<T: DeserializeOwned>(
        &self,
        handle: &BlobHandle,
        secret: &str,
    ) -> Result<T> {
        let sealed = self.retrieve_string(handle).await?;
        let json = self.sealer.unseal_str(&sealed, secret.as_bytes())?;
        Ok(serde_json::from_slice(&json)?)
    }
}

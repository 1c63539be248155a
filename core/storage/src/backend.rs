//! Storage backend trait definition.

use async_trait::async_trait;

use sealvault_common::{BlobKind, Result, Tier};

/// A single storage tier.
///
/// Backends store opaque byte payloads and hand back an id whose format is
/// their own business. Failures use the tier-level error kinds:
/// `TierUnreachable`, `NotFound` and `QuotaExceeded` (plus transient
/// `Network`/`Io`/`Timeout` errors the orchestrator may retry).
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Short backend name for logs (e.g., "remote", "filesystem").
    fn name(&self) -> &str;

    /// Tier this backend serves in the cascade.
    fn tier(&self) -> Tier;

    /// Store a payload and return its id.
    ///
    /// # Postconditions
    /// - `get` with the returned id yields `data` byte for byte
    ///
    /// # Errors
    /// - Backend unreachable
    /// - Quota exceeded
    async fn put(&self, data: &[u8], kind: BlobKind) -> Result<String>;

    /// Fetch a payload by id.
    ///
    /// # Errors
    /// - `NotFound` if this backend has no blob with that id
    /// - Backend unreachable
    async fn get(&self, id: &str) -> Result<Vec<u8>>;

    /// Remove a payload. Vault flows never call this; blobs are orphaned,
    /// not erased.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Cheap reachability probe.
    async fn health_check(&self) -> bool {
        true
    }
}

//! In-memory storage tier.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::backend::BlobBackend;
use sealvault_common::{BlobKind, Error, Result, Tier};

/// In-memory storage backend.
///
/// The last resort of the cascade. All data lives in a process-local map
/// and is lost on restart, so anything stored here is best effort only.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    storage: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    /// Create a new empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.storage.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn tier(&self) -> Tier {
        Tier::Memory
    }

    async fn put(&self, data: &[u8], kind: BlobKind) -> Result<String> {
        let id = format!("mem_{}", Uuid::new_v4().simple());
        self.storage
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.clone(), data.to_vec());

        debug!(id = %id, kind = %kind, size = data.len(), "Stored blob in memory");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let storage = self.storage.read().unwrap_or_else(|e| e.into_inner());
        storage
            .get(id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Blob not found in memory: {}", id)))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut storage = self.storage.write().unwrap_or_else(|e| e.into_inner());
        storage
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("Blob not found in memory: {}", id)))
    }
}

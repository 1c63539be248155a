//! Local encrypted cache storage tier.
//!
//! Items live in the host key-value surface as one JSON document. Every
//! payload is sealed again with a secret derived from a short hash of its
//! own leading bytes; the hash travels with the item, so the cache can be
//! read back in pure fallback scenarios without the caller's key.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::BlobBackend;
use crate::config::CacheConfig;
use crate::kv::KeyValueStore;
use sealvault_common::{BlobKind, Error, Result, Tier};
use sealvault_crypto::{short_hash, Sealer};

/// Key of the cache document in the key-value store.
pub const CACHE_KEY: &str = "sealvault:fallback_cache";

/// One cached blob as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackCacheItem {
    pub id: String,
    /// Base64 sealed payload.
    pub encrypted_payload: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: BlobKind,
    /// Short hash the item's sealing secret is derived from.
    pub key_hint: String,
}

/// Item metadata without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheItemInfo {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: BlobKind,
    /// Length of the sealed payload text.
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub item_count: usize,
    pub max_items: usize,
    pub total_bytes: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

fn item_secret(key_hint: &str) -> String {
    format!("sealvault-cache:{}", key_hint)
}

/// Local encrypted cache backend.
pub struct LocalCacheBackend {
    kv: Arc<dyn KeyValueStore>,
    sealer: Sealer,
    config: CacheConfig,
    items: Mutex<Vec<FallbackCacheItem>>,
}

impl LocalCacheBackend {
    /// Open the cache, loading any items already in `kv`.
    ///
    /// # Errors
    /// - The stored cache document does not parse
    pub fn open(kv: Arc<dyn KeyValueStore>, sealer: Sealer, config: CacheConfig) -> Result<Self> {
        let items: Vec<FallbackCacheItem> = match kv.get(CACHE_KEY)? {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| Error::Serialization(format!("Corrupt fallback cache: {}", e)))?,
            None => Vec::new(),
        };

        debug!(items = items.len(), "Opened fallback cache");

        Ok(Self {
            kv,
            sealer,
            config,
            items: Mutex::new(items),
        })
    }

    /// Item metadata, newest first.
    pub fn list_items(&self) -> Vec<CacheItemInfo> {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let mut infos: Vec<CacheItemInfo> = items
            .iter()
            .map(|item| CacheItemInfo {
                id: item.id.clone(),
                timestamp: item.timestamp,
                kind: item.kind,
                size: item.encrypted_payload.len(),
            })
            .collect();
        // Stable sort keeps later insertions ahead on equal timestamps.
        infos.reverse();
        infos.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        infos
    }

    pub fn stats(&self) -> CacheStats {
        let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let mut by_kind = BTreeMap::new();
        for item in items.iter() {
            *by_kind.entry(item.kind.to_string()).or_insert(0) += 1;
        }

        CacheStats {
            item_count: items.len(),
            max_items: self.config.max_items,
            total_bytes: items.iter().map(|i| i.encrypted_payload.len()).sum(),
            by_kind,
            oldest: items.iter().map(|i| i.timestamp).min(),
            newest: items.iter().map(|i| i.timestamp).max(),
        }
    }

    /// Drop every cached item.
    pub fn clear(&self) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        self.kv.remove(CACHE_KEY)?;
        let dropped = items.len();
        items.clear();
        info!(dropped, "Cleared fallback cache");
        Ok(())
    }

    fn persist(&self, items: &[FallbackCacheItem]) -> Result<()> {
        let json = serde_json::to_string(items)?;
        self.kv.set(CACHE_KEY, &json).map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::StorageFull => {
                Error::QuotaExceeded(format!("Host storage full: {}", io))
            }
            other => other,
        })
    }

    /// Evict oldest-first until the cap holds. Returns evicted ids.
    fn evict(&self, items: &mut Vec<FallbackCacheItem>) -> Vec<String> {
        let mut evicted = Vec::new();
        while items.len() > self.config.max_items {
            // min_by_key keeps the earliest-inserted item on timestamp ties.
            let oldest = items
                .iter()
                .enumerate()
                .min_by_key(|(_, item)| item.timestamp)
                .map(|(idx, _)| idx);
            match oldest {
                Some(idx) => evicted.push(items.remove(idx).id),
                None => break,
            }
        }
        evicted
    }
}

#[async_trait]
impl BlobBackend for LocalCacheBackend {
    fn name(&self) -> &str {
        "local_cache"
    }

    fn tier(&self) -> Tier {
        Tier::LocalCache
    }

    async fn put(&self, data: &[u8], kind: BlobKind) -> Result<String> {
        if data.len() > self.config.max_item_bytes {
            return Err(Error::QuotaExceeded(format!(
                "Item of {} bytes exceeds cache limit of {}",
                data.len(),
                self.config.max_item_bytes
            )));
        }

        let key_hint = short_hash(data);
        let encrypted_payload = self
            .sealer
            .seal_to_string(data, item_secret(&key_hint).as_bytes())?;

        let item = FallbackCacheItem {
            id: format!("cache_{}", Uuid::new_v4().simple()),
            encrypted_payload,
            timestamp: Utc::now(),
            kind,
            key_hint,
        };
        let id = item.id.clone();

        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = items.clone();
        next.push(item);
        let evicted = self.evict(&mut next);

        // Memory only changes once the host has the new document.
        self.persist(&next)?;
        *items = next;

        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted oldest cache items");
        }
        debug!(id = %id, kind = %kind, "Cached blob");
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Vec<u8>> {
        let item = {
            let items = self.items.lock().unwrap_or_else(|e| e.into_inner());
            items
                .iter()
                .find(|item| item.id == id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("Blob not in cache: {}", id)))?
        };

        self.sealer.unseal_str(
            &item.encrypted_payload,
            item_secret(&item.key_hint).as_bytes(),
        )
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let mut next = items.clone();
        next.retain(|item| item.id != id);
        if next.len() == items.len() {
            return Err(Error::NotFound(format!("Blob not in cache: {}", id)));
        }
        self.persist(&next)?;
        *items = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use sealvault_crypto::KdfParams;

    fn open_cache(kv: Arc<dyn KeyValueStore>, max_items: usize) -> LocalCacheBackend {
        LocalCacheBackend::open(
            kv,
            Sealer::new(KdfParams::with_iterations(10)),
            CacheConfig {
                max_items,
                ..CacheConfig::default()
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_get() {
        let cache = open_cache(Arc::new(MemoryKv::new()), 10);

        let id = cache.put(b"payload", BlobKind::Vault).await.unwrap();

        assert_eq!(cache.get(&id).await.unwrap(), b"payload");
    }

    #[tokio::test]
    async fn test_payload_is_sealed_at_rest() {
        let kv = Arc::new(MemoryKv::new());
        let cache = open_cache(kv.clone(), 10);

        cache.put(b"plain-marker-text", BlobKind::Secrets).await.unwrap();

        let raw = kv.get(CACHE_KEY).unwrap().unwrap();
        assert!(!raw.contains("plain-marker-text"));
        assert!(raw.contains("\"type\":\"secrets\""));
    }

    #[tokio::test]
    async fn test_eviction_keeps_most_recent() {
        const MAX_ITEMS: usize = 100;
        let cache = open_cache(Arc::new(MemoryKv::new()), MAX_ITEMS);

        let mut ids = Vec::new();
        for i in 0..MAX_ITEMS + 10 {
            let data = format!("item-{}", i);
            ids.push(cache.put(data.as_bytes(), BlobKind::Vault).await.unwrap());
        }

        let listed: Vec<String> = cache.list_items().into_iter().map(|i| i.id).collect();
        assert_eq!(listed.len(), MAX_ITEMS);

        for evicted in &ids[..10] {
            assert!(matches!(cache.get(evicted).await, Err(Error::NotFound(_))));
        }
        for (offset, kept) in ids[10..].iter().enumerate() {
            let data = cache.get(kept).await.unwrap();
            assert_eq!(data, format!("item-{}", offset + 10).into_bytes());
        }
    }

    #[tokio::test]
    async fn test_list_items_newest_first() {
        let cache = open_cache(Arc::new(MemoryKv::new()), 10);
        let first = cache.put(b"a", BlobKind::Vault).await.unwrap();
        let second = cache.put(b"b", BlobKind::Registry).await.unwrap();

        let listed = cache.list_items();
        assert_eq!(listed[0].id, second);
        assert_eq!(listed[1].id, first);
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let id = {
            let cache = open_cache(kv.clone(), 10);
            cache.put(b"durable", BlobKind::Account).await.unwrap()
        };

        let reopened = open_cache(kv, 10);
        assert_eq!(reopened.get(&id).await.unwrap(), b"durable");
    }

    #[tokio::test]
    async fn test_stats_and_clear() {
        let cache = open_cache(Arc::new(MemoryKv::new()), 10);
        cache.put(b"one", BlobKind::Vault).await.unwrap();
        cache.put(b"two", BlobKind::Vault).await.unwrap();
        cache.put(b"three", BlobKind::Registry).await.unwrap();

        let stats = cache.stats();
        assert_eq!(stats.item_count, 3);
        assert_eq!(stats.max_items, 10);
        assert_eq!(stats.by_kind.get("vault"), Some(&2));
        assert_eq!(stats.by_kind.get("registry"), Some(&1));
        assert!(stats.total_bytes > 0);
        assert!(stats.oldest <= stats.newest);

        cache.clear().unwrap();
        assert_eq!(cache.stats().item_count, 0);
        assert!(cache.list_items().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_item_is_quota_error() {
        let cache = LocalCacheBackend::open(
            Arc::new(MemoryKv::new()),
            Sealer::new(KdfParams::with_iterations(10)),
            CacheConfig {
                max_items: 10,
                max_item_bytes: 8,
                path: None,
            },
        )
        .unwrap();

        assert!(matches!(
            cache.put(&[0u8; 9], BlobKind::Vault).await,
            Err(Error::QuotaExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_tampered_item_fails_to_unseal() {
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryKv::new());
        let id = open_cache(kv.clone(), 10)
            .put(b"payload", BlobKind::Vault)
            .await
            .unwrap();

        let raw = kv.get(CACHE_KEY).unwrap().unwrap();
        let mut items: Vec<FallbackCacheItem> = serde_json::from_str(&raw).unwrap();
        items[0].key_hint = "0000000000000000".to_string();
        kv.set(CACHE_KEY, &serde_json::to_string(&items).unwrap())
            .unwrap();

        let reopened = open_cache(kv, 10);
        assert!(matches!(
            reopened.get(&id).await,
            Err(Error::DecryptionFailed)
        ));
    }
}

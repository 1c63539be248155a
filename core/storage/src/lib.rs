//! Tiered blob storage for SealVault.
//!
//! This module provides a trait-based interface over four storage tiers and
//! an orchestrator that cascades across them:
//!
//! 1. [`RemoteBackend`]: content-addressed remote blob network
//! 2. [`FilesystemBackend`]: one file per blob under a dedicated directory
//! 3. [`LocalCacheBackend`]: bounded, additionally sealed host cache
//! 4. [`MemoryBackend`]: process-lifetime last resort
//!
//! # Design Principles
//! - Tier isolation: callers only ever see [`BlobHandle`]s, never tier internals
//! - Async operations: every backend call is a suspension point
//! - Absorbed failures: individual tier errors never reach the caller; only
//!   total exhaustion does
//!
//! [`BlobHandle`]: sealvault_common::BlobHandle

pub mod backend;
pub mod cache;
pub mod config;
pub mod filesystem;
pub mod kv;
pub mod memory;
pub mod orchestrator;
pub mod remote;
pub mod retry;

pub use backend::BlobBackend;
pub use cache::{CacheItemInfo, CacheStats, FallbackCacheItem, LocalCacheBackend};
pub use config::{CacheConfig, FilesystemConfig, RemoteConfig, StorageConfig, TimeoutConfig};
pub use filesystem::FilesystemBackend;
pub use kv::{FileKv, KeyValueStore, MemoryKv};
pub use memory::MemoryBackend;
pub use orchestrator::{StoreStatus, TierStatus, TieredStore};
pub use remote::RemoteBackend;
pub use retry::{RetryConfig, RetryExecutor};

//! Vault layer for SealVault.
//!
//! This module provides:
//! - A self-hosting registry mapping users to their current vault blob
//! - The vault data model: entries, search, stats, export, integrity checks
//! - The vault manager, expressing every mutation as a new sealed blob
//! - Engine wiring from a single configuration
//!
//! # Architecture
//! The vault layer sits between callers and the tiered store. Callers pass
//! a user id and secret; sealing and tier selection stay inside.

pub mod config;
pub mod engine;
pub mod manager;
pub mod model;
pub mod registry;

pub use config::{EngineConfig, RegistryConfig};
pub use engine::VaultEngine;
pub use manager::VaultManager;
pub use model::{
    EntryPatch, IntegrityReport, NewEntry, SearchQuery, VaultData, VaultEntry, VaultExport,
    VaultMetadata, VaultStats, REDACTED,
};
pub use registry::{AuthType, Registry, RegistryEntry};

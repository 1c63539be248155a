//! Common utilities and types shared across SealVault crates.
//!
//! This module provides the error taxonomy used by every layer of the engine
//! and the small value types (tiers, blob handles, user identifiers) that
//! cross crate boundaries.

pub mod error;
pub mod types;

pub use error::{Error, Result, TierFailure};
pub use types::{BlobHandle, BlobKind, Tier, UserId};

//! Common error types for SealVault.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::Tier;

/// Fixed text shown for authentication failures.
const DECRYPTION_FAILED_MESSAGE: &str = "incorrect credentials or corrupted data";

/// Fixed text shown when no storage tier could serve a request.
const UNAVAILABLE_MESSAGE: &str = "temporarily unavailable, retry later";

/// The reason a single tier failed during a cascaded operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFailure {
    /// Tier that was attempted.
    pub tier: Tier,
    /// Human-readable failure reason.
    pub reason: String,
}

impl TierFailure {
    pub fn new(tier: Tier, reason: impl Into<String>) -> Self {
        Self {
            tier,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TierFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.tier, self.reason)
    }
}

fn join_failures(failures: &[TierFailure]) -> String {
    if failures.is_empty() {
        return "no tiers configured".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Top-level error type for SealVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Structural check of a sealed blob failed before decryption.
    #[error("Invalid sealed blob format: {0}")]
    FormatInvalid(String),

    /// Authentication tag did not verify.
    ///
    /// Wrong key and corrupted data are deliberately indistinguishable.
    #[error("Decryption failed")]
    DecryptionFailed,

    /// A storage tier could not be reached or refused the request.
    #[error("Tier {tier} unreachable: {reason}")]
    TierUnreachable { tier: Tier, reason: String },

    /// Blob or resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage tier is full.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Every tier in the cascade failed.
    #[error("All storage tiers exhausted: {}", join_failures(.0))]
    AllTiersExhausted(Vec<TierFailure>),

    /// Vault entry with the given id does not exist.
    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    /// No vault is registered for this user yet.
    #[error("No vault registered for user {0}")]
    RegistryMiss(String),

    /// Cryptographic operation failed for a reason other than authentication.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Network request failed.
    #[error("Network error: {0}")]
    Network(String),

    /// Operation exceeded its time budget.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Whether a retry against the same tier could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::Io(_) | Error::Timeout(_) | Error::TierUnreachable { .. }
        )
    }

    /// Message suitable for showing to an end user.
    ///
    /// Storage and crypto failures collapse to fixed strings so callers cannot
    /// leak why authentication failed.
    pub fn user_message(&self) -> String {
        match self {
            Error::AllTiersExhausted(_) => UNAVAILABLE_MESSAGE.to_string(),
            Error::DecryptionFailed | Error::FormatInvalid(_) => {
                DECRYPTION_FAILED_MESSAGE.to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

//! Common types used throughout SealVault.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque identifier of a vault owner.
///
/// Supplied by the login flow and never interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Create a new UserId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or only whitespace
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(crate::Error::InvalidInput(
                "UserId cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One storage backend in the fallback cascade, in cascade order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Content-addressed remote blob network.
    Remote,
    /// Server-side filesystem directory.
    Filesystem,
    /// Host key-value cache, additionally sealed.
    LocalCache,
    /// Process-lifetime map. Best effort only.
    Memory,
}

impl Tier {
    /// All tiers in cascade order.
    pub const ALL: [Tier; 4] = [Tier::Remote, Tier::Filesystem, Tier::LocalCache, Tier::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Remote => "remote",
            Tier::Filesystem => "filesystem",
            Tier::LocalCache => "local_cache",
            Tier::Memory => "memory",
        }
    }

    /// Whether data written to this tier survives a process restart.
    pub fn is_durable(&self) -> bool {
        !matches!(self, Tier::Memory)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Tier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown tier: {}", s)))
    }
}

/// What a stored blob holds. Recorded by the cache tier and used in file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobKind {
    Vault,
    Registry,
    Secrets,
    Account,
}

impl BlobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlobKind::Vault => "vault",
            BlobKind::Registry => "registry",
            BlobKind::Secrets => "secrets",
            BlobKind::Account => "account",
        }
    }
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pointer to a stored blob, tagged with the tier that holds it.
///
/// The `id` format differs per tier and must only ever be handed back to
/// the storage orchestrator, never parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobHandle {
    pub id: String,
    pub tier: Tier,
}

impl BlobHandle {
    pub fn new(id: impl Into<String>, tier: Tier) -> Self {
        Self {
            id: id.into(),
            tier,
        }
    }
}

impl fmt::Display for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_creation() {
        let id = UserId::new("0xabc").unwrap();
        assert_eq!(id.as_str(), "0xabc");
    }

    #[test]
    fn test_user_id_empty_fails() {
        assert!(UserId::new("").is_err());
        assert!(UserId::new("   ").is_err());
    }

    #[test]
    fn test_tier_order_matches_cascade() {
        let mut tiers = vec![Tier::Memory, Tier::Remote, Tier::LocalCache, Tier::Filesystem];
        tiers.sort();
        assert_eq!(tiers, Tier::ALL.to_vec());
    }

    #[test]
    fn test_tier_parse() {
        assert_eq!("local_cache".parse::<Tier>().unwrap(), Tier::LocalCache);
        assert!("tape".parse::<Tier>().is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_user_id_display_is_identity(raw in "[a-zA-Z0-9_:.@-]{1,64}") {
            let id = UserId::new(raw.clone()).unwrap();
            proptest::prop_assert_eq!(id.to_string(), raw);
        }
    }

    #[test]
    fn test_handle_serialization() {
        let handle = BlobHandle::new("abc123", Tier::Filesystem);
        let json = serde_json::to_string(&handle).unwrap();
        assert_eq!(json, r#"{"id":"abc123","tier":"filesystem"}"#);
        let restored: BlobHandle = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, handle);
    }
}

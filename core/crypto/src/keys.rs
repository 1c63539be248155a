//! Key types with secure memory handling.
//!
//! All key types automatically zeroize their memory on drop to prevent
//! sensitive data from persisting in memory.

use rand::RngCore;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the per-blob KDF salt.
pub const SALT_LENGTH: usize = 16;

/// Length of the AES-GCM initialization vector (96-bit).
pub const IV_LENGTH: usize = 12;

/// Symmetric key derived from a user secret and a salt.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealingKey {
    key: [u8; KEY_LENGTH],
}

impl SealingKey {
    /// Create a sealing key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealingKey([REDACTED])")
    }
}

/// Salt for key derivation. One per sealed blob, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LENGTH]);

impl Salt {
    /// Generate a random salt.
    pub fn generate() -> Self {
        let mut salt = [0u8; SALT_LENGTH];
        rand::rng().fill_bytes(&mut salt);
        Self(salt)
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; SALT_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; SALT_LENGTH] {
        &self.0
    }
}

/// AES-GCM initialization vector. One per sealed blob, never reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Iv([u8; IV_LENGTH]);

impl Iv {
    /// Generate a random IV.
    pub fn generate() -> Self {
        let mut iv = [0u8; IV_LENGTH];
        rand::rng().fill_bytes(&mut iv);
        Self(iv)
    }

    pub fn from_bytes(bytes: [u8; IV_LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LENGTH] {
        &self.0
    }
}

/// Number of leading payload bytes fed into [`short_hash`].
pub const SHORT_HASH_WINDOW: usize = 32;

/// Short hex digest over the first [`SHORT_HASH_WINDOW`] bytes of `data`.
///
/// Deterministic and not secret; the fallback cache derives its per-item
/// sealing secret from it.
pub fn short_hash(data: &[u8]) -> String {
    use blake2::digest::consts::U8;
    use blake2::{Blake2b, Digest};

    let window = &data[..data.len().min(SHORT_HASH_WINDOW)];
    let mut hasher = Blake2b::<U8>::new();
    hasher.update(window);
    hasher.update(b"sealvault-cache");
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salt_generate() {
        let salt1 = Salt::generate();
        let salt2 = Salt::generate();

        // Random salts should be different
        assert_ne!(salt1.as_bytes(), salt2.as_bytes());
    }

    #[test]
    fn test_iv_generate() {
        assert_ne!(Iv::generate().as_bytes(), Iv::generate().as_bytes());
    }

    #[test]
    fn test_short_hash_depends_on_prefix_only() {
        let mut a = vec![7u8; 64];
        let mut b = vec![7u8; 64];
        a[50] = 1;
        b[50] = 2;
        assert_eq!(short_hash(&a), short_hash(&b));

        b[0] = 9;
        assert_ne!(short_hash(&a), short_hash(&b));
        assert_eq!(short_hash(&a).len(), 16);
    }

    #[test]
    fn test_sealing_key_debug_redacts() {
        let key = SealingKey::from_bytes([0xAB; KEY_LENGTH]);
        assert_eq!(format!("{:?}", key), "SealingKey([REDACTED])");
    }
}

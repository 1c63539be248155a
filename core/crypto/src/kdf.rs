//! Key derivation using PBKDF2-HMAC-SHA256.

use pbkdf2::pbkdf2_hmac;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::keys::{Salt, SealingKey, KEY_LENGTH};
use sealvault_common::{Error, Result};

/// Iteration count used for every stored blob.
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Parameters for PBKDF2 key derivation.
///
/// The iteration count is not embedded in sealed blobs, so every reader of a
/// blob must use the same parameters as its writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Number of PBKDF2 rounds.
    pub iterations: u32,
}

impl KdfParams {
    /// Parameters with a custom iteration count.
    ///
    /// Lower counts are only meant for tests.
    pub fn with_iterations(iterations: u32) -> Self {
        Self { iterations }
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
        }
    }
}

/// Derive a 256-bit sealing key from a user secret and salt.
///
/// # Preconditions
/// - `secret` must not be empty
/// - `params.iterations` must be non-zero
///
/// # Postconditions
/// - The derived key is deterministic given the same inputs
///
/// # Security
/// - Secret is not stored or logged
/// - Key material is zeroized when the returned key is dropped
pub fn derive_key(secret: &[u8], salt: &Salt, params: &KdfParams) -> Result<SealingKey> {
    if secret.is_empty() {
        return Err(Error::InvalidInput("Secret cannot be empty".to_string()));
    }
    if params.iterations == 0 {
        return Err(Error::Crypto(
            "KDF iteration count must be non-zero".to_string(),
        ));
    }

    let mut key_bytes = [0u8; KEY_LENGTH];
    pbkdf2_hmac::<Sha256>(secret, salt.as_bytes(), params.iterations, &mut key_bytes);

    Ok(SealingKey::from_bytes(key_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::with_iterations(1_000)
    }

    #[test]
    fn test_derive_key_deterministic() {
        let salt = Salt::from_bytes([42u8; 16]);

        let key1 = derive_key(b"s3cr3t", &salt, &fast()).unwrap();
        let key2 = derive_key(b"s3cr3t", &salt, &fast()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_salt() {
        let salt1 = Salt::from_bytes([1u8; 16]);
        let salt2 = Salt::from_bytes([2u8; 16]);

        let key1 = derive_key(b"s3cr3t", &salt1, &fast()).unwrap();
        let key2 = derive_key(b"s3cr3t", &salt2, &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_derive_key_different_secret() {
        let salt = Salt::from_bytes([42u8; 16]);

        let key1 = derive_key(b"secret1", &salt, &fast()).unwrap();
        let key2 = derive_key(b"secret2", &salt, &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_known_vector() {
        // RFC 7914 section 11, PBKDF2-HMAC-SHA256 with c = 1.
        let salt_bytes: [u8; 4] = *b"salt";
        let mut out = [0u8; 64];
        pbkdf2_hmac::<Sha256>(b"passwd", &salt_bytes, 1, &mut out);
        assert_eq!(&out[..4], &[0x55, 0xac, 0x04, 0x6e]);
    }

    #[test]
    fn test_empty_secret_fails() {
        let salt = Salt::generate();
        assert!(matches!(
            derive_key(b"", &salt, &fast()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_zero_iterations_fails() {
        let salt = Salt::generate();
        assert!(derive_key(b"x", &salt, &KdfParams::with_iterations(0)).is_err());
    }

    #[test]
    fn test_default_iterations() {
        assert_eq!(KdfParams::default().iterations, 100_000);
    }
}

//! Sealed blob layout and the seal/unseal entry points.
//!
//! ```text
//! [SALT(16)][IV(12)][CIPHERTEXT(N)][TAG(16)]
//! ```
//!
//! Blobs travel and rest as standard base64 text. This layout is the only
//! persisted format the engine defines; changing it breaks every stored vault.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

use crate::aead::{self, TAG_SIZE};
use crate::kdf::{derive_key, KdfParams};
use crate::keys::{Iv, Salt, IV_LENGTH, SALT_LENGTH};
use sealvault_common::{Error, Result};

/// Smallest structurally valid sealed blob: salt, IV and an empty-plaintext tag.
pub const MIN_SEALED_LEN: usize = SALT_LENGTH + IV_LENGTH + TAG_SIZE;

/// An immutable sealed payload in its binary layout.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedBlob {
    bytes: Vec<u8>,
}

impl SealedBlob {
    /// Wrap raw layout bytes.
    ///
    /// # Errors
    /// - `FormatInvalid` if shorter than [`MIN_SEALED_LEN`]
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() < MIN_SEALED_LEN {
            return Err(Error::FormatInvalid(format!(
                "expected at least {} bytes, got {}",
                MIN_SEALED_LEN,
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    /// Parse base64 transport text.
    pub fn decode(text: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| Error::FormatInvalid(format!("invalid base64: {}", e)))?;
        Self::from_bytes(bytes)
    }

    /// Render as base64 transport text.
    pub fn encode(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    pub fn salt(&self) -> Salt {
        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(&self.bytes[..SALT_LENGTH]);
        Salt::from_bytes(salt)
    }

    pub fn iv(&self) -> Iv {
        let mut iv = [0u8; IV_LENGTH];
        iv.copy_from_slice(&self.bytes[SALT_LENGTH..SALT_LENGTH + IV_LENGTH]);
        Iv::from_bytes(iv)
    }

    pub fn ciphertext_and_tag(&self) -> &[u8] {
        &self.bytes[SALT_LENGTH + IV_LENGTH..]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for SealedBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SealedBlob({} bytes)", self.bytes.len())
    }
}

/// Structural pre-check of base64 sealed text. Never attempts decryption.
pub fn validate_format(text: &str) -> bool {
    SealedBlob::decode(text).is_ok()
}

/// Seals and unseals payloads under a fixed set of KDF parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sealer {
    params: KdfParams,
}

impl Sealer {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &KdfParams {
        &self.params
    }

    /// Seal `plaintext` under a key derived from `secret`.
    ///
    /// A fresh salt and IV are generated on every call, so sealing the same
    /// input twice yields different blobs.
    pub fn seal(&self, plaintext: &[u8], secret: &[u8]) -> Result<SealedBlob> {
        let salt = Salt::generate();
        let iv = Iv::generate();
        let key = derive_key(secret, &salt, &self.params)?;

        let ciphertext = aead::encrypt(&key, &iv, plaintext)?;

        let mut bytes = Vec::with_capacity(SALT_LENGTH + IV_LENGTH + ciphertext.len());
        bytes.extend_from_slice(salt.as_bytes());
        bytes.extend_from_slice(iv.as_bytes());
        bytes.extend_from_slice(&ciphertext);

        debug!(len = bytes.len(), "Sealed payload");
        SealedBlob::from_bytes(bytes)
    }

    /// Unseal a blob with the secret it was sealed under.
    ///
    /// # Errors
    /// - `DecryptionFailed` on wrong secret or any corruption
    pub fn unseal(&self, blob: &SealedBlob, secret: &[u8]) -> Result<Vec<u8>> {
        let key = derive_key(secret, &blob.salt(), &self.params)?;
        aead::decrypt(&key, &blob.iv(), blob.ciphertext_and_tag())
    }

    /// Seal and render as base64 text.
    pub fn seal_to_string(&self, plaintext: &[u8], secret: &[u8]) -> Result<String> {
        Ok(self.seal(plaintext, secret)?.encode())
    }

    /// Validate, decode and unseal base64 text.
    ///
    /// Format errors are reported before any key derivation happens.
    pub fn unseal_str(&self, text: &str, secret: &[u8]) -> Result<Vec<u8>> {
        let blob = SealedBlob::decode(text)?;
        self.unseal(&blob, secret)
    }
}

/// Seal with default parameters.
pub fn seal(plaintext: &[u8], secret: &[u8]) -> Result<SealedBlob> {
    Sealer::default().seal(plaintext, secret)
}

/// Unseal with default parameters.
pub fn unseal(blob: &SealedBlob, secret: &[u8]) -> Result<Vec<u8>> {
    Sealer::default().unseal(blob, secret)
}

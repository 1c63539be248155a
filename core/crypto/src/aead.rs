//! Authenticated encryption using AES-256-GCM.
//!
//! The IV is supplied by the caller so the sealed-blob layout can place it
//! explicitly; the 16-byte tag is appended to the ciphertext.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};

use crate::keys::{Iv, SealingKey};
use sealvault_common::{Error, Result};

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encrypt plaintext with AES-256-GCM.
///
/// # Postconditions
/// - Returns ciphertext || tag
/// - Output length is plaintext length + TAG_SIZE
///
/// # Security
/// - Caller must never reuse an IV with the same key
pub fn encrypt(key: &SealingKey, iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid key: {}", e)))?;

    cipher
        .encrypt(Nonce::from_slice(iv.as_bytes()), plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))
}

/// Decrypt ciphertext || tag with AES-256-GCM.
///
/// # Errors
/// - `DecryptionFailed` if the tag does not verify (wrong key or tampered data)
/// - `FormatInvalid` if the input is shorter than a tag
///
/// # Security
/// - Authenticates before returning any plaintext
pub fn decrypt(key: &SealingKey, iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::FormatInvalid("Ciphertext too short".to_string()));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| Error::Crypto(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(iv.as_bytes()), ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}

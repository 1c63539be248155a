//! Sealing engine for SealVault.
//!
//! This module provides:
//! - Key derivation using PBKDF2-HMAC-SHA256
//! - Authenticated encryption using AES-256-GCM
//! - The stable sealed-blob layout `salt(16) || iv(12) || ciphertext || tag(16)`
//! - Secure key handling with automatic zeroization
//!
//! # Security Guarantees
//! - A fresh salt and IV are drawn for every seal
//! - All key material is zeroized on drop
//! - No plaintext or key material is ever logged
//! - Authentication failures never say why they failed

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod seal;

pub use aead::{decrypt, encrypt};
pub use kdf::{derive_key, KdfParams};
pub use keys::{short_hash, Iv, Salt, SealingKey};
pub use seal::{seal, unseal, validate_format, SealedBlob, Sealer};

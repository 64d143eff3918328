//! Cryptographic primitives for the journal sync core.
//!
//! This module provides:
//! - Argon2id key derivation from the account password
//! - Versioned symmetric encryption and HMAC integrity tags
//! - X25519 sealed boxes for key exchange between devices

pub mod asymmetric;
pub mod cipher;
pub mod kdf;

pub use asymmetric::{
    get_key_fingerprint, pretty_fingerprint, AsymmetricCryptoManager, AsymmetricKeyPair,
};
pub use cipher::{CryptoManager, ProtocolVersion, HMAC_SIZE};
pub use kdf::{derive_key, derive_key_with_params, DerivedKey, KdfParams, DERIVED_KEY_LEN};

use thiserror::Error;

/// Errors raised by the low-level primitives.
///
/// Failures that mean "this data cannot be trusted" are reported as
/// [`crate::Error::Integrity`] instead, so callers never have to tell a
/// padding failure apart from a tag mismatch.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KdfFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Key context mismatch: expected {expected}, got {got}")]
    ContextMismatch { expected: String, got: String },
}

//! Argon2id key derivation for the account password.
//!
//! The salt is the account identifier (the username), so any device that
//! knows the password can re-derive the identical key without exchanging
//! salt material first. Argon2 requires at least 8 bytes of salt, so the
//! identifier is hashed with SHA-256 before use.

use crate::crypto::CryptoError;
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of a derived key in bytes.
pub const DERIVED_KEY_LEN: usize = 190;

/// Cost parameters for Argon2id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub mem_cost: u32,

    /// Time cost (number of passes)
    pub time_cost: u32,

    /// Parallelism (number of lanes)
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// Tuned to cost on the order of seconds on a mobile device.
    fn default() -> Self {
        Self {
            mem_cost: 65_536, // 64 MB
            time_cost: 3,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Smallest memory cost accepted by [`KdfParams::validate`].
    pub const MIN_MEM_COST: u32 = 8_192;

    /// Cheap parameters for unit and integration tests.
    pub fn for_testing() -> Self {
        Self {
            mem_cost: Self::MIN_MEM_COST,
            time_cost: 1,
            parallelism: 1,
        }
    }

    /// Verify that parameters are within acceptable ranges
    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.mem_cost < Self::MIN_MEM_COST {
            return Err(CryptoError::KdfFailed(
                "Memory cost too low (minimum: 8 MB)".to_string(),
            ));
        }
        if self.time_cost < 1 {
            return Err(CryptoError::KdfFailed(
                "Time cost too low (minimum: 1)".to_string(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CryptoError::KdfFailed(
                "Parallelism too low (minimum: 1)".to_string(),
            ));
        }
        Ok(())
    }
}

/// High-entropy key derived from the account password.
///
/// Owned by the caller for the session and wiped from memory on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: Vec<u8>,
}

impl PartialEq for DerivedKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.as_slice().ct_eq(other.key.as_slice()).into()
    }
}

impl Eq for DerivedKey {}

impl DerivedKey {
    /// Wrap key material restored from the caller's secure storage.
    pub fn from_bytes(key: Vec<u8>) -> Self {
        Self { key }
    }

    /// Get the raw key bytes (use sparingly)
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    pub fn len(&self) -> usize {
        self.key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key.is_empty()
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DerivedKey([REDACTED; {}])", self.key.len())
    }
}

/// Derive the account key with the default (production) cost.
pub fn derive_key(salt: &str, password: &str) -> Result<DerivedKey, CryptoError> {
    derive_key_with_params(salt, password, &KdfParams::default())
}

/// Derive the account key from `password`, salted with `salt`.
///
/// Deterministic: identical inputs always yield the identical key. The
/// only failure modes are invalid parameters and Argon2 being unable to
/// allocate its working memory, both of which are unrecoverable.
pub fn derive_key_with_params(
    salt: &str,
    password: &str,
    params: &KdfParams,
) -> Result<DerivedKey, CryptoError> {
    params.validate()?;

    let params_obj = Params::new(
        params.mem_cost,
        params.time_cost,
        params.parallelism,
        Some(DERIVED_KEY_LEN),
    )
    .map_err(|e| CryptoError::KdfFailed(format!("Invalid parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params_obj);
    let salt_bytes = Sha256::digest(salt.as_bytes());

    let mut key = vec![0u8; DERIVED_KEY_LEN];
    argon2
        .hash_password_into(password.as_bytes(), &salt_bytes, &mut key)
        .map_err(|e| CryptoError::KdfFailed(format!("Hashing failed: {}", e)))?;

    Ok(DerivedKey { key })
}

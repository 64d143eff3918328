//! Versioned symmetric encryption and integrity tags for journal content.
//!
//! A [`CryptoManager`] is bound to `(version, base key, context)`:
//! - root key: HMAC-SHA256 keyed by the context, over the base key
//! - cipher sub-key: HMAC-SHA256 keyed by `"aes"`, over the root key
//! - MAC sub-key: HMAC-SHA256 keyed by `"hmac"`, over the root key
//!
//! Every supported version encrypts with AES-256-CBC and PKCS#7 padding
//! under a fresh random 16-byte IV, emitted as `iv(16) || ciphertext`.

use crate::crypto::{CryptoError, DerivedKey};
use crate::{Error, Result};
use aes::Aes256;
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

type HmacSha256 = Hmac<Sha256>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Length of an integrity tag in bytes.
pub const HMAC_SIZE: usize = 32;

const IV_SIZE: usize = 16;
const BLOCK_SIZE: usize = 16;

/// Protocol version selecting the algorithm suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Legacy suite: tags cover the data only.
    V1,
    /// Current suite: tags also cover the version byte, so a tag computed
    /// under one version never verifies under another.
    V2,
}

/// Per-version algorithm configuration.
#[derive(Debug, Clone, Copy)]
struct CipherSuite {
    cipher_label: &'static [u8],
    mac_label: &'static [u8],
    binds_version: bool,
}

impl ProtocolVersion {
    /// Lowest version this client accepts.
    pub const MIN: u32 = 1;
    /// Highest version this client understands.
    pub const MAX: u32 = 2;
    /// Version used for newly created objects.
    pub const CURRENT: Self = Self::V2;

    /// Map a version number read from the wire.
    ///
    /// Versions above [`Self::MAX`] fail with [`Error::VersionTooNew`] so an
    /// outdated client can ask for an upgrade; anything below [`Self::MIN`]
    /// is treated as corrupt data.
    pub fn from_wire(version: u32) -> Result<Self> {
        match version {
            1 => Ok(Self::V1),
            2 => Ok(Self::V2),
            v if v > Self::MAX => Err(Error::VersionTooNew {
                version: v,
                max: Self::MAX,
            }),
            v => Err(Error::integrity(format!(
                "Protocol version {} is below the minimum supported ({})",
                v,
                Self::MIN
            ))),
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            Self::V1 => 1,
            Self::V2 => 2,
        }
    }

    fn suite(self) -> CipherSuite {
        match self {
            Self::V1 => CipherSuite {
                cipher_label: b"aes",
                mac_label: b"hmac",
                binds_version: false,
            },
            Self::V2 => CipherSuite {
                cipher_label: b"aes",
                mac_label: b"hmac",
                binds_version: true,
            },
        }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> std::result::Result<[u8; HMAC_SIZE], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(format!("HMAC key rejected: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = [0u8; HMAC_SIZE];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Symmetric encryption and integrity tags for one journal (or other
/// context). Immutable after construction; sub-keys are wiped on drop.
#[derive(ZeroizeOnDrop)]
pub struct CryptoManager {
    #[zeroize(skip)]
    version: ProtocolVersion,
    #[zeroize(skip)]
    context: String,
    cipher_key: [u8; 32],
    mac_key: [u8; 32],
}

impl CryptoManager {
    /// Build a manager for a version number as declared on the wire.
    pub fn new(version: u32, base_key: &[u8], context: &str) -> Result<Self> {
        Self::with_version(ProtocolVersion::from_wire(version)?, base_key, context)
    }

    /// Build a manager keyed from the account's derived key.
    pub fn from_derived_key(version: u32, key: &DerivedKey, context: &str) -> Result<Self> {
        Self::new(version, key.as_bytes(), context)
    }

    pub fn with_version(version: ProtocolVersion, base_key: &[u8], context: &str) -> Result<Self> {
        if base_key.is_empty() {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got: 0,
            }
            .into());
        }

        let suite = version.suite();
        let mut root = hmac_sha256(context.as_bytes(), &[base_key])?;
        let cipher_key = hmac_sha256(suite.cipher_label, &[root.as_slice()]);
        let mac_key = hmac_sha256(suite.mac_label, &[root.as_slice()]);
        zeroize::Zeroize::zeroize(&mut root);

        Ok(Self {
            version,
            context: context.to_string(),
            cipher_key: cipher_key?,
            mac_key: mac_key?,
        })
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    /// The context the keys were derived for, usually a journal uid.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Fail unless this manager was derived for `context`.
    pub fn ensure_context(&self, context: &str) -> Result<()> {
        if self.context == context {
            return Ok(());
        }
        Err(CryptoError::ContextMismatch {
            expected: context.to_string(),
            got: self.context.clone(),
        }
        .into())
    }

    /// Encrypt `plaintext` under a fresh random IV.
    ///
    /// Returns `iv(16) || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);

        let cipher = Aes256CbcEnc::new_from_slices(&self.cipher_key, &iv)
            .map_err(|e| CryptoError::EncryptionFailed(format!("{}", e)))?;
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        let mut result = Vec::with_capacity(IV_SIZE + ciphertext.len());
        result.extend_from_slice(&iv);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    /// Decrypt `iv(16) || ciphertext`.
    ///
    /// Any failure (truncated input, bad padding, wrong key) is reported as
    /// the same [`Error::Integrity`] so the caller learns nothing about
    /// which check tripped.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < IV_SIZE + BLOCK_SIZE || (ciphertext.len() - IV_SIZE) % BLOCK_SIZE != 0
        {
            return Err(Error::integrity("Decryption failed"));
        }

        let (iv, body) = ciphertext.split_at(IV_SIZE);
        let cipher = Aes256CbcDec::new_from_slices(&self.cipher_key, iv)
            .map_err(|_| Error::integrity("Decryption failed"))?;
        cipher
            .decrypt_padded_vec_mut::<Pkcs7>(body)
            .map_err(|_| Error::integrity("Decryption failed"))
    }

    /// Keyed integrity tag over `data`.
    pub fn hmac(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.tag(&[data])
    }

    /// Integrity tag over `uid || content`.
    pub fn calculate_hmac(&self, uid: &str, content: &[u8]) -> Result<Vec<u8>> {
        self.tag(&[uid.as_bytes(), content])
    }

    /// Recompute the tag over `uid || content` and compare in constant time.
    pub fn verify_hmac(&self, uid: &str, content: &[u8], tag: &[u8]) -> Result<()> {
        let expected = self.calculate_hmac(uid, content)?;
        if expected.as_slice().ct_eq(tag).into() {
            Ok(())
        } else {
            tracing::warn!(uid, "integrity tag mismatch");
            Err(Error::integrity(format!("HMAC mismatch for {}", uid)))
        }
    }

    fn tag(&self, parts: &[&[u8]]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.mac_key)
            .map_err(|e| CryptoError::InvalidKey(format!("HMAC key rejected: {}", e)))?;
        for part in parts {
            mac.update(part);
        }
        if self.version.suite().binds_version {
            mac.update(&[self.version.as_u32() as u8]);
        }
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl fmt::Debug for CryptoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoManager")
            .field("version", &self.version)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

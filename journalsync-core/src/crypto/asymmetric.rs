//! X25519 key pairs for sharing key material between devices.
//!
//! Public-key encryption is a sealed box: a fresh ephemeral X25519 key
//! agrees a secret with the recipient, HKDF-SHA256 turns it into an
//! AES-256-GCM key, and the output is
//! `ephemeral_pk(32) || nonce(12) || ciphertext || auth_tag(16)`.

use crate::crypto::CryptoError;
use crate::{Error, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use hkdf::Hkdf;
use sha2::{Digest, Sha256};
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};
use zeroize::{ZeroizeOnDrop, Zeroizing};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const SEALED_BOX_INFO: &[u8] = b"journalsync-sealed-box-v1";

/// A device's X25519 key pair. The private half is wiped on drop.
#[derive(Clone, ZeroizeOnDrop)]
pub struct AsymmetricKeyPair {
    #[zeroize(skip)]
    public_key: [u8; KEY_LEN],
    private_key: [u8; KEY_LEN],
}

impl AsymmetricKeyPair {
    /// Generate a fresh key pair from the OS random source.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            public_key: public.to_bytes(),
            private_key: secret.to_bytes(),
        }
    }

    /// Restore a key pair, checking that the halves belong together.
    pub fn from_bytes(public_key: &[u8], private_key: &[u8]) -> Result<Self> {
        let public_key = to_key_array(public_key)?;
        let private_key = Zeroizing::new(to_key_array(private_key)?);

        let derived = PublicKey::from(&StaticSecret::from(*private_key));
        if derived.to_bytes() != public_key {
            return Err(CryptoError::InvalidKey(
                "Public key does not match private key".to_string(),
            )
            .into());
        }

        Ok(Self {
            public_key,
            private_key: *private_key,
        })
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// Get the raw private key bytes (use sparingly)
    pub fn private_key(&self) -> &[u8] {
        &self.private_key
    }
}

impl fmt::Debug for AsymmetricKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsymmetricKeyPair")
            .field("fingerprint", &get_key_fingerprint(&self.public_key))
            .finish_non_exhaustive()
    }
}

/// Public-key encryption keyed by one specific key pair.
#[derive(Debug, Clone)]
pub struct AsymmetricCryptoManager {
    key_pair: AsymmetricKeyPair,
}

impl AsymmetricCryptoManager {
    pub fn new(key_pair: AsymmetricKeyPair) -> Self {
        Self { key_pair }
    }

    pub fn generate_key_pair() -> AsymmetricKeyPair {
        AsymmetricKeyPair::generate()
    }

    pub fn key_pair(&self) -> &AsymmetricKeyPair {
        &self.key_pair
    }

    /// Seal `plaintext` so that only the holder of `public_key`'s private
    /// half can open it.
    pub fn encrypt(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        seal(public_key, plaintext)
    }

    /// Open a sealed box addressed to this instance's key pair.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < KEY_LEN + NONCE_LEN + TAG_LEN {
            return Err(Error::integrity("Sealed box too short"));
        }

        let (ephemeral, rest) = ciphertext.split_at(KEY_LEN);
        let (nonce, body) = rest.split_at(NONCE_LEN);
        let ephemeral = PublicKey::from(to_key_array(ephemeral)?);

        let secret = StaticSecret::from(self.key_pair.private_key);
        let shared = secret.diffie_hellman(&ephemeral);
        if !shared.was_contributory() {
            return Err(Error::integrity("Sealed box uses a low-order key"));
        }

        let key = box_key(shared.as_bytes(), ephemeral.as_bytes(), &self.key_pair.public_key)?;
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| CryptoError::InvalidKey(format!("{}", e)))?;

        cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| Error::integrity("Sealed box authentication failed"))
    }
}

fn seal(public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let recipient = PublicKey::from(to_key_array(public_key)?);

    let ephemeral_secret = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral = PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(&recipient);
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey("Recipient key is a low-order point".to_string()).into());
    }

    let key = box_key(shared.as_bytes(), ephemeral.as_bytes(), recipient.as_bytes())?;
    let cipher = Aes256Gcm::new_from_slice(&key[..])
        .map_err(|e| CryptoError::InvalidKey(format!("{}", e)))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext_with_tag = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed(format!("Sealing failed: {}", e)))?;

    let mut result = Vec::with_capacity(KEY_LEN + NONCE_LEN + ciphertext_with_tag.len());
    result.extend_from_slice(ephemeral.as_bytes());
    result.extend_from_slice(nonce.as_slice());
    result.extend_from_slice(&ciphertext_with_tag);
    Ok(result)
}

fn box_key(
    shared: &[u8; KEY_LEN],
    ephemeral: &[u8; KEY_LEN],
    recipient: &[u8; KEY_LEN],
) -> std::result::Result<Zeroizing<[u8; KEY_LEN]>, CryptoError> {
    let mut salt = [0u8; KEY_LEN * 2];
    salt[..KEY_LEN].copy_from_slice(ephemeral);
    salt[KEY_LEN..].copy_from_slice(recipient);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt[..]), shared);
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    hkdf.expand(SEALED_BOX_INFO, &mut key[..])
        .map_err(|e| CryptoError::KdfFailed(format!("HKDF expand failed: {}", e)))?;
    Ok(key)
}

fn to_key_array(bytes: &[u8]) -> std::result::Result<[u8; KEY_LEN], CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_LEN,
        got: bytes.len(),
    })
}

/// Lowercase hex SHA-256 of a public key, for out-of-band verification.
pub fn get_key_fingerprint(public_key: &[u8]) -> String {
    hex::encode(Sha256::digest(public_key))
}

/// The fingerprint split into blocks of four, eight blocks per line.
pub fn pretty_fingerprint(public_key: &[u8]) -> String {
    let fingerprint = get_key_fingerprint(public_key);
    let blocks: Vec<&str> = (0..fingerprint.len())
        .step_by(4)
        .map(|i| &fingerprint[i..i + 4])
        .collect();
    blocks
        .chunks(8)
        .map(|line| line.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

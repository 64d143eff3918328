//! Journal Sync Core Library
//!
//! Client-side core for an encrypted, tamper-evident, append-only journal
//! of collection records synchronized against a remote server:
//! - Argon2id password-based key derivation
//! - Versioned AES-256-CBC encryption with HMAC-SHA256 integrity tags
//! - X25519 key pairs for exchanging key material across devices
//! - Blocking HTTP protocol clients for journals, entries and user info

pub mod config;
pub mod crypto;
pub mod sync;

pub use config::ClientConfig;
pub use crypto::{
    derive_key, derive_key_with_params, get_key_fingerprint, AsymmetricCryptoManager,
    AsymmetricKeyPair, CryptoError, CryptoManager, DerivedKey, KdfParams, ProtocolVersion,
};
pub use sync::{
    ApiClient, AuthToken, CollectionInfo, CollectionType, Journal, JournalAuthenticator,
    JournalEntry, JournalEntryManager, JournalManager, JournalMember, RefreshTracker,
    ReqwestTransport, SyncAction, SyncEntry, Transport, UserInfo, UserInfoManager,
};

use thiserror::Error;

/// Result type for journal sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy surfaced by every fallible operation of the core.
///
/// Callers branch on the variant: `Unauthorized` means re-authenticate,
/// `ServiceUnavailable` may be retried with backoff, `Integrity` and
/// `VersionTooNew` are fatal for the data at hand.
#[derive(Error, Debug)]
pub enum Error {
    /// Credentials or token rejected; `status` is 401, or 400 from the
    /// token endpoint.
    #[error("Unauthorized ({status}): {message}")]
    Unauthorized { status: u16, message: String },

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Protocol version {version} is newer than the highest supported ({max})")]
    VersionTooNew { version: u32, max: u32 },

    #[error("Crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Journal {0} is shared but no key pair was supplied")]
    MissingKeyPair(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status carried by the error, if it came from a server response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Unauthorized { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server rejected a write because its precondition no longer holds.
    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }

    /// The target no longer exists; benign when cleaning up.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub(crate) fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity(message.into())
    }
}

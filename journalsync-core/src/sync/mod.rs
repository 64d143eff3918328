//! Journal sync protocol
//!
//! Blocking clients for the journal server:
//! - Token authentication (`auth`)
//! - Journal CRUD with per-journal HMAC verification (`journals`)
//! - Append-only entry log with an HMAC chain over entry uids (`entries`)
//! - Public key bundle publication and retrieval (`user_info`)
//!
//! All requests go through [`client::ApiClient`], which maps HTTP status
//! codes onto [`crate::Error`].

pub mod auth;
pub mod client;
pub mod entries;
pub mod in_flight;
pub mod journals;
pub mod models;
pub mod user_info;

pub use auth::{AuthToken, JournalAuthenticator};
pub use client::{
    ApiClient, Body, HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError,
};
pub use entries::{verify_chain, JournalEntry, JournalEntryManager};
pub use in_flight::{RefreshGuard, RefreshTracker};
pub use journals::{generate_journal_key, Journal, JournalManager, JournalMember};
pub use models::{CollectionInfo, CollectionType, SyncAction, SyncEntry};
pub use user_info::{UserInfo, UserInfoManager};

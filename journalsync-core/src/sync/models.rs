//! Sync data models: wire format and the plaintext payloads carried inside
//! encrypted journal and entry content.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Journal as exchanged with the server.
///
/// `content` is `tag(32) || ciphertext`; `key`, when present, is the
/// journal key sealed to the requesting user's public key. `key_tag` is the
/// owner's account-key tag over `uid || key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalJson {
    pub uid: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub key: Option<Vec<u8>>,
    #[serde(default, with = "base64_opt", skip_serializing_if = "Option::is_none")]
    pub key_tag: Option<Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_uid: Option<String>,
}

/// One journal entry on the wire. `content` is the encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryJson {
    pub uid: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

/// Public key bundle on the wire. `content` is `tag(32) || ciphertext`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfoJson {
    pub owner: String,
    pub version: u32,
    #[serde(with = "base64_bytes")]
    pub pubkey: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

/// Journal membership: the journal key sealed to `user`'s public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberJson {
    pub user: String,
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
}

/// Kind of collection a journal holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CollectionType {
    AddressBook,
    Calendar,
    Tasks,
}

/// Decrypted journal content: the collection descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionInfo {
    #[serde(rename = "type")]
    pub collection_type: CollectionType,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// ARGB color
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub supports_events: bool,
    #[serde(default)]
    pub supports_tasks: bool,
}

impl CollectionInfo {
    pub fn new(collection_type: CollectionType, display_name: impl Into<String>) -> Self {
        Self {
            collection_type,
            display_name: display_name.into(),
            description: None,
            color: None,
            time_zone: None,
            read_only: false,
            supports_events: collection_type == CollectionType::Calendar,
            supports_tasks: collection_type == CollectionType::Tasks,
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::InvalidResponse(format!("Failed to encode collection: {}", e)))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidResponse(format!("Malformed collection info: {}", e)))
    }
}

/// What a journal entry does to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncAction {
    Add,
    Change,
    Delete,
}

impl SyncAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "ADD",
            Self::Change => "CHANGE",
            Self::Delete => "DELETE",
        }
    }
}

/// Decrypted entry content: an action applied to one item (a vCard or
/// iCalendar blob).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    pub action: SyncAction,
    pub content: String,
}

impl SyncEntry {
    pub fn new(action: SyncAction, content: impl Into<String>) -> Self {
        Self {
            action,
            content: content.into(),
        }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::InvalidResponse(format!("Failed to encode entry: {}", e)))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::InvalidResponse(format!("Malformed sync entry: {}", e)))
    }
}

/// Custom base64 serialization for `Vec<u8>`.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Same as `base64_bytes`, for optional fields. `null` reads as `None`.
mod base64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => s.serialize_str(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(s) => STANDARD
                .decode(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

//! Append-only journal entries.
//!
//! Each entry's uid is the hex HMAC over `previous uid || content`, so the
//! uids form a chain: reordering, dropping or editing an entry breaks every
//! uid after it. The first entry chains from the empty string.

use crate::crypto::CryptoManager;
use crate::sync::auth::AuthToken;
use crate::sync::client::{ApiClient, HttpRequest};
use crate::sync::models::{EntryJson, SyncEntry};
use crate::{Error, Result};

/// One encrypted change record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub uid: String,
    pub content: Vec<u8>,
}

impl JournalEntry {
    /// Encrypt `plaintext` and chain it after `prev`.
    pub fn new(crypto: &CryptoManager, prev: Option<&str>, plaintext: &[u8]) -> Result<Self> {
        let content = crypto.encrypt(plaintext)?;
        let uid = hex::encode(crypto.calculate_hmac(prev.unwrap_or(""), &content)?);
        Ok(Self { uid, content })
    }

    pub fn from_sync_entry(
        crypto: &CryptoManager,
        prev: Option<&str>,
        entry: &SyncEntry,
    ) -> Result<Self> {
        Self::new(crypto, prev, &entry.to_json()?)
    }

    /// Check that this entry's uid chains from `prev`.
    pub fn verify(&self, crypto: &CryptoManager, prev: Option<&str>) -> Result<()> {
        let tag = hex::decode(&self.uid)
            .map_err(|_| Error::integrity(format!("Entry uid {} is not a tag", self.uid)))?;
        crypto
            .verify_hmac(prev.unwrap_or(""), &self.content, &tag)
            .map_err(|_| Error::integrity(format!("Entry {} breaks the journal chain", self.uid)))
    }

    /// Verify against `prev`, then decrypt.
    pub fn decrypt(&self, crypto: &CryptoManager, prev: Option<&str>) -> Result<Vec<u8>> {
        self.verify(crypto, prev)?;
        crypto.decrypt(&self.content)
    }

    pub fn sync_entry(&self, crypto: &CryptoManager, prev: Option<&str>) -> Result<SyncEntry> {
        SyncEntry::from_json(&self.decrypt(crypto, prev)?)
    }
}

impl From<EntryJson> for JournalEntry {
    fn from(json: EntryJson) -> Self {
        Self {
            uid: json.uid,
            content: json.content,
        }
    }
}

impl From<&JournalEntry> for EntryJson {
    fn from(entry: &JournalEntry) -> Self {
        Self {
            uid: entry.uid.clone(),
            content: entry.content.clone(),
        }
    }
}

/// Verify `entries` in order, starting from `prev`.
pub fn verify_chain(
    crypto: &CryptoManager,
    prev: Option<&str>,
    entries: &[JournalEntry],
) -> Result<()> {
    let mut prev = prev;
    for entry in entries {
        entry.verify(crypto, prev)?;
        prev = Some(entry.uid.as_str());
    }
    Ok(())
}

/// Entry log of the journals on the server.
#[derive(Debug, Clone)]
pub struct JournalEntryManager {
    client: ApiClient,
    token: AuthToken,
}

impl JournalEntryManager {
    pub fn new(client: ApiClient, token: AuthToken) -> Self {
        Self { client, token }
    }

    fn entries_path(journal_uid: &str) -> String {
        format!("api/v1/journals/{}/entries/", journal_uid)
    }

    /// Entries after `last`, oldest first, as the server stores them.
    pub fn list(
        &self,
        journal_uid: &str,
        last: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<JournalEntry>> {
        let mut request = HttpRequest::get(Self::entries_path(journal_uid)).auth(&self.token);
        if let Some(last) = last {
            request = request.query("last", last);
        }
        if let Some(limit) = limit {
            request = request.query("limit", limit.to_string());
        }

        let entries: Vec<EntryJson> = self.client.execute(request)?.json()?;
        Ok(entries.into_iter().map(JournalEntry::from).collect())
    }

    /// Like [`Self::list`], rejecting the batch if any uid breaks the chain
    /// that continues from `last`.
    pub fn list_verified(
        &self,
        crypto: &CryptoManager,
        journal_uid: &str,
        last: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<JournalEntry>> {
        let entries = self.list(journal_uid, last, limit)?;
        verify_chain(crypto, last, &entries)?;
        Ok(entries)
    }

    /// Append `entries` after `last`, the newest entry uid this client has
    /// seen. If another writer got there first the server answers 409
    /// ([`Error::is_conflict`]); the caller must fetch and rebuild its
    /// entries on the new head.
    pub fn create(
        &self,
        journal_uid: &str,
        entries: &[JournalEntry],
        last: Option<&str>,
    ) -> Result<()> {
        let body: Vec<EntryJson> = entries.iter().map(EntryJson::from).collect();
        let mut request = HttpRequest::post(Self::entries_path(journal_uid)).auth(&self.token);
        if let Some(last) = last {
            request = request.query("last", last);
        }

        match self.client.execute(request.json(&body)?) {
            Ok(_) => {
                tracing::debug!(journal = journal_uid, count = entries.len(), "entries appended");
                Ok(())
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(journal = journal_uid, last, "entry log moved on; append rejected");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }
}

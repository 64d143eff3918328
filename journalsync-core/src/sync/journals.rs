//! Journals: encrypted, integrity-tagged collection metadata.
//!
//! A journal's content is a [`CollectionInfo`] encrypted under the
//! journal's [`CryptoManager`], tagged with `HMAC(uid || ciphertext)`.
//! Shared journals carry their own random key, sealed to each member's
//! public key; private journals are keyed from the account key. The owner's
//! sealed key is additionally tagged under the account key, so the server
//! cannot hand the owner a key of its own choosing.

use crate::crypto::{
    AsymmetricCryptoManager, CryptoError, CryptoManager, DerivedKey, ProtocolVersion, HMAC_SIZE,
};
use crate::sync::auth::AuthToken;
use crate::sync::client::{ApiClient, HttpRequest};
use crate::sync::models::{CollectionInfo, JournalJson, MemberJson};
use crate::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use uuid::Uuid;
use zeroize::Zeroizing;

const JOURNALS_PATH: &str = "api/v1/journals/";

/// Context of the account-key manager that tags sealed journal keys.
const JOURNAL_KEY_CONTEXT: &str = "journalKey";

/// Length of a shared journal key.
pub const JOURNAL_KEY_LEN: usize = 32;

/// Fresh random key for a shared journal.
pub fn generate_journal_key() -> Zeroizing<Vec<u8>> {
    let mut key = Zeroizing::new(vec![0u8; JOURNAL_KEY_LEN]);
    OsRng.fill_bytes(&mut key);
    key
}

/// A journal as held by the client: ciphertext, tag and routing metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Journal {
    uid: String,
    version: u32,
    owner: Option<String>,
    content: Vec<u8>,
    tag: Vec<u8>,
    key: Option<Vec<u8>>,
    key_tag: Option<Vec<u8>>,
    read_only: bool,
    last_uid: Option<String>,
}

fn key_tag_manager(key: &DerivedKey) -> Result<CryptoManager> {
    CryptoManager::with_version(ProtocolVersion::V2, key.as_bytes(), JOURNAL_KEY_CONTEXT)
}

impl Journal {
    /// Encrypt `info` into a new journal with the given uid.
    ///
    /// `crypto` must have been derived for `uid`.
    pub fn new(crypto: &CryptoManager, uid: impl Into<String>, info: &CollectionInfo) -> Result<Self> {
        let uid = uid.into();
        crypto.ensure_context(&uid)?;
        let content = crypto.encrypt(&info.to_json()?)?;
        let tag = crypto.calculate_hmac(&uid, &content)?;

        Ok(Self {
            uid,
            version: crypto.version().as_u32(),
            owner: None,
            content,
            tag,
            key: None,
            key_tag: None,
            read_only: false,
            last_uid: None,
        })
    }

    /// Create a journal under a fresh random key, sealed to `key_pair`'s
    /// own public key so other devices of the same user can open it.
    /// The sealed key is tagged under the account `key`.
    pub fn new_shared(
        key: &DerivedKey,
        uid: impl Into<String>,
        info: &CollectionInfo,
        key_pair: &AsymmetricCryptoManager,
    ) -> Result<Self> {
        let uid = uid.into();
        let journal_key = generate_journal_key();
        let crypto = CryptoManager::with_version(ProtocolVersion::CURRENT, &journal_key, &uid)?;

        let mut journal = Self::new(&crypto, uid, info)?;
        let sealed = key_pair.encrypt(key_pair.key_pair().public_key(), &journal_key)?;
        journal.key_tag = Some(key_tag_manager(key)?.calculate_hmac(&journal.uid, &sealed)?);
        journal.key = Some(sealed);
        Ok(journal)
    }

    /// Random uid for a new journal. A uid rejected by the server as a
    /// duplicate must be replaced, never retried.
    pub fn generate_uid() -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Protocol version as declared by the server, not yet validated.
    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    /// Sealed journal key, present on shared journals.
    pub fn key(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    /// Account-key tag over `uid || key`, present on the owner's copy.
    pub fn key_tag(&self) -> Option<&[u8]> {
        self.key_tag.as_deref()
    }

    pub fn is_shared(&self) -> bool {
        self.key.is_some()
    }

    pub fn read_only(&self) -> bool {
        self.read_only
    }

    /// Uid of the newest entry the server knows of.
    pub fn last_uid(&self) -> Option<&str> {
        self.last_uid.as_deref()
    }

    /// The [`CryptoManager`] for this journal, as seen by `username`.
    ///
    /// The declared version is checked before any key material is touched.
    /// Shared journals need `key_pair` to unseal their key; on a journal
    /// `username` owns, the sealed key must carry a valid key tag.
    pub fn crypto_manager(
        &self,
        username: &str,
        key: &DerivedKey,
        key_pair: Option<&AsymmetricCryptoManager>,
    ) -> Result<CryptoManager> {
        let version = ProtocolVersion::from_wire(self.version)?;

        if self.key.is_none() {
            return CryptoManager::with_version(version, key.as_bytes(), &self.uid);
        }
        let key_pair = key_pair.ok_or_else(|| Error::MissingKeyPair(self.uid.clone()))?;
        let journal_key = self.unseal_key(username, key, key_pair)?;
        CryptoManager::with_version(version, &journal_key, &self.uid)
    }

    fn owned_by(&self, username: &str) -> bool {
        self.owner.as_deref().map_or(true, |owner| owner == username)
    }

    /// Check the account-key tag over the sealed key.
    ///
    /// Only the owner can: members never hold the owner's account key.
    pub fn verify_key(&self, key: &DerivedKey) -> Result<()> {
        let sealed = self.sealed_key()?;
        let tag = self.key_tag.as_deref().ok_or_else(|| {
            tracing::warn!(uid = %self.uid, "shared journal without key tag");
            Error::integrity(format!("Journal {} key is not tagged", self.uid))
        })?;
        key_tag_manager(key)?.verify_hmac(&self.uid, sealed, tag)
    }

    fn sealed_key(&self) -> Result<&[u8]> {
        self.key.as_deref().ok_or_else(|| {
            Error::Crypto(CryptoError::InvalidKey(format!(
                "Journal {} has no journal key",
                self.uid
            )))
        })
    }

    /// Check the integrity tag over `uid || content`.
    pub fn verify(&self, crypto: &CryptoManager) -> Result<()> {
        crypto.verify_hmac(&self.uid, &self.content, &self.tag)
    }

    /// Verify, then decrypt.
    pub fn decrypt(&self, crypto: &CryptoManager) -> Result<Vec<u8>> {
        self.verify(crypto)?;
        crypto.decrypt(&self.content)
    }

    pub fn collection_info(&self, crypto: &CryptoManager) -> Result<CollectionInfo> {
        CollectionInfo::from_json(&self.decrypt(crypto)?)
    }

    /// Replace the content with `info`, re-encrypted and re-tagged under
    /// `crypto`. The whole record is replaced; there is no merging.
    pub fn set_collection_info(&mut self, crypto: &CryptoManager, info: &CollectionInfo) -> Result<()> {
        crypto.ensure_context(&self.uid)?;
        let content = crypto.encrypt(&info.to_json()?)?;
        self.tag = crypto.calculate_hmac(&self.uid, &content)?;
        self.content = content;
        self.version = crypto.version().as_u32();
        Ok(())
    }

    /// The raw journal key of a shared journal, unsealed with `key_pair`.
    ///
    /// If `username` owns the journal the key tag is verified first.
    pub fn unseal_key(
        &self,
        username: &str,
        key: &DerivedKey,
        key_pair: &AsymmetricCryptoManager,
    ) -> Result<Zeroizing<Vec<u8>>> {
        let sealed = self.sealed_key()?;
        if self.owned_by(username) {
            self.verify_key(key)?;
        }
        Ok(Zeroizing::new(key_pair.decrypt(sealed)?))
    }

    pub fn to_wire(&self) -> JournalJson {
        let mut content = Vec::with_capacity(self.tag.len() + self.content.len());
        content.extend_from_slice(&self.tag);
        content.extend_from_slice(&self.content);

        JournalJson {
            uid: self.uid.clone(),
            version: self.version,
            owner: self.owner.clone(),
            content,
            read_only: self.read_only,
            key: self.key.clone(),
            key_tag: self.key_tag.clone(),
            last_uid: self.last_uid.clone(),
        }
    }

    pub fn from_wire(json: JournalJson) -> Result<Self> {
        if json.content.len() < HMAC_SIZE {
            return Err(Error::integrity(format!(
                "Journal {} content shorter than its tag",
                json.uid
            )));
        }
        let mut tag = json.content;
        let content = tag.split_off(HMAC_SIZE);

        Ok(Self {
            uid: json.uid,
            version: json.version,
            owner: json.owner,
            content,
            tag,
            key: json.key,
            key_tag: json.key_tag,
            read_only: json.read_only,
            last_uid: json.last_uid,
        })
    }
}

/// A member of a shared journal and the journal key sealed to them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalMember {
    pub user: String,
    pub key: Vec<u8>,
}

impl JournalMember {
    /// Seal `journal_key` (from [`Journal::unseal_key`]) to
    /// `recipient_public_key`.
    pub fn for_recipient(
        user: impl Into<String>,
        journal_key: &[u8],
        key_pair: &AsymmetricCryptoManager,
        recipient_public_key: &[u8],
    ) -> Result<Self> {
        Ok(Self {
            user: user.into(),
            key: key_pair.encrypt(recipient_public_key, journal_key)?,
        })
    }
}

impl From<MemberJson> for JournalMember {
    fn from(json: MemberJson) -> Self {
        Self {
            user: json.user,
            key: json.key,
        }
    }
}

impl From<&JournalMember> for MemberJson {
    fn from(member: &JournalMember) -> Self {
        Self {
            user: member.user.clone(),
            key: member.key.clone(),
        }
    }
}

/// Journal CRUD and membership against the server.
#[derive(Debug, Clone)]
pub struct JournalManager {
    client: ApiClient,
    token: AuthToken,
    username: String,
}

impl JournalManager {
    /// `username` is the account `token` belongs to; it decides which
    /// journals must carry an owner key tag.
    pub fn new(client: ApiClient, token: AuthToken, username: impl Into<String>) -> Self {
        Self {
            client,
            token,
            username: username.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn journal_path(uid: &str) -> String {
        format!("{}{}/", JOURNALS_PATH, uid)
    }

    /// Fetch every journal visible to the user and verify each one.
    ///
    /// A single journal failing its version check or integrity tag fails
    /// the whole listing; nothing is silently dropped.
    pub fn list(
        &self,
        key: &DerivedKey,
        key_pair: Option<&AsymmetricCryptoManager>,
    ) -> Result<Vec<Journal>> {
        let response = self
            .client
            .execute(HttpRequest::get(JOURNALS_PATH).auth(&self.token))?;
        let wire: Vec<JournalJson> = response.json()?;

        let mut journals = Vec::with_capacity(wire.len());
        for json in wire {
            let journal = Journal::from_wire(json)?;
            journal.verify(&journal.crypto_manager(&self.username, key, key_pair)?)?;
            journals.push(journal);
        }

        tracing::debug!(count = journals.len(), "journals verified");
        Ok(journals)
    }

    /// Fetch and verify a single journal.
    pub fn fetch(
        &self,
        uid: &str,
        key: &DerivedKey,
        key_pair: Option<&AsymmetricCryptoManager>,
    ) -> Result<Journal> {
        let response = self
            .client
            .execute(HttpRequest::get(Self::journal_path(uid)).auth(&self.token))?;
        let journal = Journal::from_wire(response.json()?)?;
        journal.verify(&journal.crypto_manager(&self.username, key, key_pair)?)?;
        Ok(journal)
    }

    /// Create `journal`. A uid collision comes back as an HTTP error; the
    /// caller must generate a new uid rather than retry.
    pub fn create(&self, journal: &Journal) -> Result<()> {
        let request = HttpRequest::post(JOURNALS_PATH)
            .auth(&self.token)
            .json(&journal.to_wire())?;
        self.client.execute(request)?;
        tracing::info!(uid = %journal.uid, "journal created");
        Ok(())
    }

    /// Replace content and tag of an existing journal. Last writer wins.
    pub fn update(&self, journal: &Journal) -> Result<()> {
        let request = HttpRequest::put(Self::journal_path(&journal.uid))
            .auth(&self.token)
            .json(&journal.to_wire())?;
        self.client.execute(request)?;
        tracing::info!(uid = %journal.uid, "journal updated");
        Ok(())
    }

    /// Delete `journal`. Deleting an already deleted journal fails with a
    /// 404 ([`Error::is_not_found`]).
    pub fn delete(&self, journal: &Journal) -> Result<()> {
        self.client.execute(
            HttpRequest::delete(Self::journal_path(&journal.uid)).auth(&self.token),
        )?;
        tracing::info!(uid = %journal.uid, "journal deleted");
        Ok(())
    }

    pub fn list_members(&self, journal: &Journal) -> Result<Vec<JournalMember>> {
        let path = format!("{}members/", Self::journal_path(&journal.uid));
        let response = self
            .client
            .execute(HttpRequest::get(path).auth(&self.token))?;
        let members: Vec<MemberJson> = response.json()?;
        Ok(members.into_iter().map(JournalMember::from).collect())
    }

    pub fn add_member(&self, journal: &Journal, member: &JournalMember) -> Result<()> {
        let path = format!("{}members/", Self::journal_path(&journal.uid));
        let request = HttpRequest::post(path)
            .auth(&self.token)
            .json(&MemberJson::from(member))?;
        self.client.execute(request)?;
        tracing::info!(uid = %journal.uid, user = %member.user, "journal member added");
        Ok(())
    }

    pub fn remove_member(&self, journal: &Journal, user: &str) -> Result<()> {
        let path = format!("{}members/{}/", Self::journal_path(&journal.uid), user);
        self.client
            .execute(HttpRequest::delete(path).auth(&self.token))?;
        tracing::info!(uid = %journal.uid, user, "journal member removed");
        Ok(())
    }
}

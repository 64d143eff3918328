//! Public key bundles.
//!
//! A user's bundle is their X25519 public key plus the private key
//! encrypted under the account key. It is published once from the first
//! device and fetched by every later one.

use crate::crypto::{
    get_key_fingerprint, AsymmetricKeyPair, CryptoManager, DerivedKey, ProtocolVersion, HMAC_SIZE,
};
use crate::sync::auth::AuthToken;
use crate::sync::client::{ApiClient, HttpRequest};
use crate::sync::models::UserInfoJson;
use crate::{Error, Result};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

const USER_INFO_PATH: &str = "api/v1/user/";

/// Key context for the bundle's [`CryptoManager`].
pub const USER_INFO_CONTEXT: &str = "userInfo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    owner: String,
    version: u32,
    public_key: Vec<u8>,
    content: Vec<u8>,
    tag: Vec<u8>,
}

impl UserInfo {
    /// Seal `key_pair`'s private key into a new bundle for `owner`.
    pub fn generate(
        crypto: &CryptoManager,
        owner: impl Into<String>,
        key_pair: &AsymmetricKeyPair,
    ) -> Result<Self> {
        let content = crypto.encrypt(key_pair.private_key())?;
        let tag = crypto.hmac(&content)?;

        Ok(Self {
            owner: owner.into(),
            version: crypto.version().as_u32(),
            public_key: key_pair.public_key().to_vec(),
            content,
            tag,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn tag(&self) -> &[u8] {
        &self.tag
    }

    pub fn fingerprint(&self) -> String {
        get_key_fingerprint(&self.public_key)
    }

    /// Manager for this bundle, after checking its declared version.
    pub fn crypto_manager(&self, key: &DerivedKey) -> Result<CryptoManager> {
        let version = ProtocolVersion::from_wire(self.version)?;
        CryptoManager::with_version(version, key.as_bytes(), USER_INFO_CONTEXT)
    }

    /// Recompute the tag over the encrypted content and compare.
    pub fn verify(&self, crypto: &CryptoManager) -> Result<()> {
        let expected = crypto.hmac(&self.content)?;
        if expected.as_slice().ct_eq(&self.tag).into() {
            Ok(())
        } else {
            tracing::warn!(owner = %self.owner, "user info integrity tag mismatch");
            Err(Error::integrity(format!("User info of {} failed verification", self.owner)))
        }
    }

    /// Verify, then decrypt the private key and restore the key pair.
    pub fn key_pair(&self, crypto: &CryptoManager) -> Result<AsymmetricKeyPair> {
        self.verify(crypto)?;
        let private_key = Zeroizing::new(crypto.decrypt(&self.content)?);
        AsymmetricKeyPair::from_bytes(&self.public_key, &private_key)
    }

    pub fn to_wire(&self) -> UserInfoJson {
        let mut content = Vec::with_capacity(self.tag.len() + self.content.len());
        content.extend_from_slice(&self.tag);
        content.extend_from_slice(&self.content);

        UserInfoJson {
            owner: self.owner.clone(),
            version: self.version,
            pubkey: self.public_key.clone(),
            content,
        }
    }

    pub fn from_wire(json: UserInfoJson) -> Result<Self> {
        if json.content.len() < HMAC_SIZE {
            return Err(Error::integrity(format!(
                "User info of {} shorter than its tag",
                json.owner
            )));
        }
        let mut tag = json.content;
        let content = tag.split_off(HMAC_SIZE);

        Ok(Self {
            owner: json.owner,
            version: json.version,
            public_key: json.pubkey,
            content,
            tag,
        })
    }
}

/// Publishes and fetches public key bundles.
#[derive(Debug, Clone)]
pub struct UserInfoManager {
    client: ApiClient,
    token: AuthToken,
}

impl UserInfoManager {
    pub fn new(client: ApiClient, token: AuthToken) -> Self {
        Self { client, token }
    }

    fn owner_path(owner: &str) -> String {
        format!("{}{}/", USER_INFO_PATH, owner)
    }

    /// The bundle of `owner`, or `None` if none was published yet.
    pub fn get(&self, owner: &str) -> Result<Option<UserInfo>> {
        match self
            .client
            .execute(HttpRequest::get(Self::owner_path(owner)).auth(&self.token))
        {
            Ok(response) => Ok(Some(UserInfo::from_wire(response.json()?)?)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Publish a new bundle. Fails with an HTTP error if one exists, so
    /// another device's key material is never overwritten.
    pub fn create(&self, info: &UserInfo) -> Result<()> {
        let request = HttpRequest::post(USER_INFO_PATH)
            .auth(&self.token)
            .json(&info.to_wire())?;
        self.client.execute(request)?;
        tracing::info!(owner = %info.owner, "user info created");
        Ok(())
    }

    pub fn update(&self, info: &UserInfo) -> Result<()> {
        let request = HttpRequest::put(Self::owner_path(&info.owner))
            .auth(&self.token)
            .json(&info.to_wire())?;
        self.client.execute(request)?;
        tracing::info!(owner = %info.owner, "user info updated");
        Ok(())
    }

    pub fn delete(&self, info: &UserInfo) -> Result<()> {
        self.client.execute(
            HttpRequest::delete(Self::owner_path(&info.owner)).auth(&self.token),
        )?;
        tracing::info!(owner = %info.owner, "user info deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{derive_key_with_params, KdfParams};

    fn setup() -> (DerivedKey, CryptoManager, AsymmetricKeyPair) {
        let key = derive_key_with_params("alice", "pw123", &KdfParams::for_testing()).unwrap();
        let crypto = CryptoManager::from_derived_key(2, &key, USER_INFO_CONTEXT).unwrap();
        (key, crypto, AsymmetricKeyPair::generate())
    }

    #[test]
    fn bundle_restores_key_pair() {
        let (key, crypto, pair) = setup();
        let info = UserInfo::generate(&crypto, "alice", &pair).unwrap();
        assert_eq!(info.public_key(), pair.public_key());
        assert_ne!(info.content(), pair.private_key());

        let reopened = info.crypto_manager(&key).unwrap();
        let restored = info.key_pair(&reopened).unwrap();
        assert_eq!(restored.private_key(), pair.private_key());
        assert_eq!(info.fingerprint(), get_key_fingerprint(pair.public_key()));
    }

    #[test]
    fn tampered_bundle_not_decrypted() {
        let (_, crypto, pair) = setup();
        let mut info = UserInfo::generate(&crypto, "alice", &pair).unwrap();
        info.content[0] ^= 0x01;

        assert!(matches!(info.verify(&crypto), Err(Error::Integrity(_))));
        assert!(matches!(info.key_pair(&crypto), Err(Error::Integrity(_))));
    }

    #[test]
    fn wrong_password_fails_verification() {
        let (_, crypto, pair) = setup();
        let info = UserInfo::generate(&crypto, "alice", &pair).unwrap();

        let other = derive_key_with_params("alice", "not it", &KdfParams::for_testing()).unwrap();
        let wrong = info.crypto_manager(&other).unwrap();
        assert!(matches!(info.verify(&wrong), Err(Error::Integrity(_))));
    }

    #[test]
    fn swapped_public_key_rejected() {
        let (_, crypto, pair) = setup();
        let info = UserInfo::generate(&crypto, "alice", &pair).unwrap();

        let mut wire = info.to_wire();
        wire.pubkey = AsymmetricKeyPair::generate().public_key().to_vec();
        let forged = UserInfo::from_wire(wire).unwrap();
        assert!(forged.key_pair(&crypto).is_err());
    }

    #[test]
    fn wire_roundtrip_and_short_content() {
        let (_, crypto, pair) = setup();
        let info = UserInfo::generate(&crypto, "alice", &pair).unwrap();
        assert_eq!(UserInfo::from_wire(info.to_wire()).unwrap(), info);

        let mut wire = info.to_wire();
        wire.content.truncate(HMAC_SIZE - 1);
        assert!(matches!(UserInfo::from_wire(wire), Err(Error::Integrity(_))));
    }

    #[test]
    fn unsupported_version_rejected() {
        let (key, crypto, pair) = setup();
        let mut info = UserInfo::generate(&crypto, "alice", &pair).unwrap();
        info.version = 9;
        assert!(matches!(
            info.crypto_manager(&key),
            Err(Error::VersionTooNew { version: 9, .. })
        ));
    }
}

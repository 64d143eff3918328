//! Client configuration.

use crate::crypto::KdfParams;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Connection and key-derivation settings for the sync client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the journal server, e.g. `https://api.example.com/`
    pub remote_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub kdf: KdfParams,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_url: "https://api.etesync.com/".to_string(),
            timeout_secs: 30,
            user_agent: concat!("journalsync/", env!("CARGO_PKG_VERSION")).to_string(),
            kdf: KdfParams::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.remote_url)
            .map_err(|e| Error::Config(format!("Invalid remote_url: {}", e)))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(Error::Config(format!(
                "Unsupported remote_url scheme: {}",
                url.scheme()
            )));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be positive".to_string()));
        }
        self.kdf.validate()?;
        Ok(())
    }

    /// Remote URL with a guaranteed trailing slash, so relative API paths
    /// join below it instead of replacing its last segment.
    pub fn base_url(&self) -> Result<reqwest::Url> {
        let mut base = self.remote_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        reqwest::Url::parse(&base).map_err(|e| Error::Config(format!("Invalid remote_url: {}", e)))
    }
}

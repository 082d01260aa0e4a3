//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, the cookie handoff endpoint, which store keeps the credential
//! blob, and the last used username.
//!
//! Configuration is stored at `~/.config/sehatin/config.json`. The API URL
//! and store can be overridden with `SEHATIN_API_URL` and `SEHATIN_STORE`.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_TIMEOUT_SECS;
use crate::auth::{BlobStore, FileStore, KeyringStore, MemoryStore};

/// Application name used for config/data directory paths
const APP_NAME: &str = "sehatin";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// API base URL used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

pub const API_URL_ENV: &str = "SEHATIN_API_URL";
pub const STORE_ENV: &str = "SEHATIN_STORE";

/// Backend that keeps the credential blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StoreKind::File),
            "keyring" => Ok(StoreKind::Keyring),
            "memory" => Ok(StoreKind::Memory),
            other => Err(anyhow::anyhow!("Unknown store kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub handoff_url: Option<String>,
    pub store: Option<StoreKind>,
    pub request_timeout_secs: Option<u64>,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed credential blob.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn api_base_url(&self) -> String {
        Self::pick_api_url(std::env::var(API_URL_ENV).ok(), self.api_url.as_deref())
    }

    fn pick_api_url(env: Option<String>, configured: Option<&str>) -> String {
        env.filter(|v| !v.trim().is_empty())
            .or_else(|| configured.map(str::to_string))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    pub fn store_kind(&self) -> Result<StoreKind> {
        match std::env::var(STORE_ENV) {
            Ok(value) if !value.trim().is_empty() => value.parse(),
            _ => Ok(self.store.unwrap_or_default()),
        }
    }

    /// Username to log in with: the one given, else the last one used.
    pub fn login_username(&self, given: Option<&str>) -> Option<String> {
        given
            .filter(|u| !u.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.last_username.clone())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Build the configured blob store.
    pub fn blob_store(&self) -> Result<Arc<dyn BlobStore>> {
        let store: Arc<dyn BlobStore> = match self.store_kind()? {
            StoreKind::File => Arc::new(FileStore::new(self.data_dir()?)),
            StoreKind::Keyring => Arc::new(KeyringStore::open()?),
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}

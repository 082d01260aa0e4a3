use anyhow::{Context, Result};
use keyring::Entry;

use super::store::BlobStore;

const SERVICE_NAME: &str = "sehatin";

/// Entry written and read back when the store is opened.
const CHECK_KEY: &str = "__sehatin_check";

/// Keeps blobs in the OS keychain, one entry per key.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    /// Open the keychain store for the default service.
    pub fn open() -> Result<Self> {
        Self::open_service(SERVICE_NAME)
    }

    /// Open the keychain store for `service`. Fails if the keychain does not
    /// keep what is written to it, e.g. when no native backend is available.
    pub fn open_service(service: &str) -> Result<Self> {
        let store = Self {
            service: service.to_string(),
        };
        store.check_round_trip()?;
        Ok(store)
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }

    fn check_round_trip(&self) -> Result<()> {
        self.set(CHECK_KEY, "ok")?;
        let read_back = self.get(CHECK_KEY)?;
        self.remove(CHECK_KEY)?;
        if read_back.as_deref() != Some("ok") {
            anyhow::bail!("OS keychain did not keep a stored entry; no native keyring backend is available");
        }
        Ok(())
    }
}

/// Treat a missing entry as already removed.
fn ignore_missing(result: keyring::Result<()>) -> Result<()> {
    match result {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e).context("Failed to delete entry from keychain"),
    }
}

impl BlobStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve entry from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store entry in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        ignore_missing(self.entry(key)?.delete_credential())
    }
}

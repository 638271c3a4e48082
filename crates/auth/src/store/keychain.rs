//! Platform keychain backed key-value store
//!
//! Thin wrapper over the platform keychain (macOS Keychain Access, Windows
//! Credential Manager, Linux Secret Service) via the `keyring` crate. Each
//! key becomes one credential under the store's service name.
//!
//! Keychains cannot enumerate entries portably, so the store keeps an index
//! credential listing the keys it has written; [`KeyValueStore::clear`]
//! walks that index.

use std::collections::BTreeSet;

use keyring::Entry;
use parking_lot::Mutex;
use tracing::debug;

use super::{KeyValueStore, StoreError};

const INDEX_KEY: &str = "__marketdesk_index";

/// Durable store keeping each key as a keychain credential
pub struct KeychainStore {
    service_name: String,
    index_lock: Mutex<()>,
}

impl KeychainStore {
    /// Create a keychain store for a specific service
    ///
    /// # Arguments
    /// * `service_name` - Service identifier (e.g., "MarketDesk.auth")
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into(), index_lock: Mutex::new(()) }
    }

    /// Service name credentials are stored under
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, key).map_err(|e| StoreError::Keychain(e.to_string()))
    }

    fn read(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => {
                Err(StoreError::Keychain(format!("Failed to retrieve secret for {key}: {e}")))
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| StoreError::Keychain(format!("Failed to store secret for {key}: {e}")))
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::Keychain(format!("Failed to delete secret for {key}: {e}"))),
        }
    }

    fn load_index(&self) -> Result<BTreeSet<String>, StoreError> {
        match self.read(INDEX_KEY)? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(BTreeSet::new()),
        }
    }

    fn save_index(&self, index: &BTreeSet<String>) -> Result<(), StoreError> {
        if index.is_empty() {
            return self.remove(INDEX_KEY);
        }
        self.write(INDEX_KEY, &serde_json::to_string(index)?)
    }
}

impl KeyValueStore for KeychainStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        debug!(service = %self.service_name, key = %key, "Retrieving secret from keychain");
        self.read(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        debug!(service = %self.service_name, key = %key, "Storing secret in keychain");
        let _guard = self.index_lock.lock();
        self.write(key, value)?;

        let mut index = self.load_index()?;
        if index.insert(key.to_string()) {
            self.save_index(&index)?;
        }
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        debug!(service = %self.service_name, key = %key, "Deleting secret from keychain");
        let _guard = self.index_lock.lock();
        self.remove(key)?;

        let mut index = self.load_index()?;
        if index.remove(key) {
            self.save_index(&index)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.index_lock.lock();
        let index = self.load_index()?;
        debug!(service = %self.service_name, keys = index.len(), "Clearing keychain store");

        for key in &index {
            self.remove(key)?;
        }
        self.remove(INDEX_KEY)
    }
}

impl std::fmt::Debug for KeychainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainStore").field("service_name", &self.service_name).finish()
    }
}

//! Key-value storage for authentication state
//!
//! The auth client never talks to a concrete storage backend. It writes the
//! durable token record and the volatile PKCE session through
//! [`KeyValueStore`], so the same flow runs against process memory, a JSON
//! file, or the platform keychain.
//!
//! # Module Layering
//!
//! - [`MemoryStore`]: volatile, process-scoped (PKCE session, tests)
//! - [`FileStore`]: durable JSON object file, survives restarts
//! - [`KeychainStore`]: durable secret storage via the `keyring` crate
//!   (feature `keychain`)

mod file;
#[cfg(feature = "keychain")]
mod keychain;
mod memory;

pub use file::FileStore;
#[cfg(feature = "keychain")]
pub use keychain::KeychainStore;
pub use memory::MemoryStore;
use thiserror::Error;

/// Durable slot holding the serialized `AuthTokens` record
pub const TOKENS_KEY: &str = "auth_tokens";

/// Volatile slot holding the PKCE code verifier
pub const PKCE_VERIFIER_KEY: &str = "pkce_code_verifier";

/// Volatile slot holding the PKCE state nonce
pub const PKCE_STATE_KEY: &str = "pkce_state";

/// Error type for key-value store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying file or OS I/O failed
    #[error("Store I/O failed during '{operation}': {message}")]
    Io {
        /// Operation being performed (`get`, `set`, `delete`, `clear`)
        operation: &'static str,
        /// Backend error message
        message: String,
    },

    /// Stored content could not be (de)serialized
    #[error("Store serialization failed: {0}")]
    Serialization(String),

    /// Platform keychain access failed
    #[error("Keychain access failed: {0}")]
    Keychain(String),
}

impl StoreError {
    pub(crate) fn io(operation: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Io { operation, message: err.to_string() }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Trait for string key-value storage
///
/// Implementations must make `set` replace the whole value atomically from
/// the caller's point of view, and `delete`/`clear` must be idempotent.
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    ///
    /// # Errors
    /// Returns error if the backend cannot be read
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, replacing any previous value
    ///
    /// # Errors
    /// Returns error if the backend cannot be written
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete `key`; deleting a missing key succeeds
    ///
    /// # Errors
    /// Returns error if the backend cannot be written
    fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Remove every key owned by this store
    ///
    /// # Errors
    /// Returns error if the backend cannot be written
    fn clear(&self) -> Result<(), StoreError>;

    /// Read and delete `key` in one step
    ///
    /// # Errors
    /// Returns error if the backend cannot be read or written
    fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self.get(key)?;
        self.delete(key)?;
        Ok(value)
    }
}

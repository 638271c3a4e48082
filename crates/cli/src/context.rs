//! Composition root: configuration, stores and the shared client

use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use marketdesk_auth::store::{FileStore, KeychainStore};
use marketdesk_auth::{AuthClient, KeyValueStore};
use tracing::debug;

const DEFAULT_STATE_DIR: &str = ".marketdesk";
const KEYCHAIN_SERVICE: &str = "marketdesk-auth";

/// Backend for the durable token slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    File,
    Keychain,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "file" => Ok(Self::File),
            "keychain" => Ok(Self::Keychain),
            other => anyhow::bail!("MARKETDESK_STORE must be file or keychain, got '{other}'"),
        }
    }
}

/// Everything a command needs
pub struct CliContext {
    pub client: Arc<AuthClient>,
}

impl CliContext {
    /// Build the client from `MARKETDESK_*` environment variables and config files
    pub fn from_env() -> anyhow::Result<Self> {
        let config = marketdesk_auth::config::load().context("Failed to load auth configuration")?;

        let state_dir = env::var_os("MARKETDESK_STATE_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_STATE_DIR), PathBuf::from);
        let kind: StoreKind = env::var("MARKETDESK_STORE").unwrap_or_default().parse()?;

        let (durable, session) = stores(kind, &state_dir);
        debug!(state_dir = %state_dir.display(), store = ?kind, "Stores configured");

        let client = AuthClient::with_reqwest(config, durable, session)
            .context("Failed to build auth client")?;

        Ok(Self { client: Arc::new(client) })
    }
}

/// Durable and session stores for `kind` rooted at `state_dir`
///
/// The PKCE session lives in a file so `login` and `callback` can run as
/// separate invocations.
fn stores(kind: StoreKind, state_dir: &Path) -> (Arc<dyn KeyValueStore>, Arc<dyn KeyValueStore>) {
    let durable: Arc<dyn KeyValueStore> = match kind {
        StoreKind::File => Arc::new(FileStore::new(state_dir.join("tokens.json"))),
        StoreKind::Keychain => Arc::new(KeychainStore::new(KEYCHAIN_SERVICE)),
    };
    let session = Arc::new(FileStore::new(state_dir.join("session.json")));
    (durable, session)
}

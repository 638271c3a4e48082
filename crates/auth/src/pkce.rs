//! PKCE (Proof Key for Code Exchange) implementation for OAuth 2.0
//!
//! Implements RFC 7636 for secure OAuth authorization without client secrets.
//! Also owns the transient PKCE session slot: the verifier and state written
//! at login initiation and consumed exactly once by the callback.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::store::{KeyValueStore, StoreError, PKCE_STATE_KEY, PKCE_VERIFIER_KEY};

/// Number of random bytes behind verifiers and states (43 base64url chars)
const RANDOM_BYTES: usize = 32;

fn random_token() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a cryptographically secure code verifier
///
/// Returns a URL-safe base64-encoded random string of 32 bytes (43 characters).
/// Per RFC 7636, verifiers must be 43-128 characters long.
#[must_use]
pub fn generate_code_verifier() -> String {
    random_token()
}

/// Generate code challenge from verifier using SHA256
///
/// Per RFC 7636, the challenge is BASE64URL(SHA256(ASCII(code_verifier)))
/// with no padding.
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random state token for CSRF protection
///
/// Same encoding as the verifier, drawn independently.
#[must_use]
pub fn generate_state() -> String {
    random_token()
}

/// Validate that the state token matches
///
/// Strict equality, compared in constant time for equal-length inputs.
#[must_use]
pub fn validate_state(expected: &str, actual: &str) -> bool {
    let (expected, actual) = (expected.as_bytes(), actual.as_bytes());
    if expected.len() != actual.len() {
        return false;
    }
    expected.iter().zip(actual).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// PKCE material for one authorization attempt
#[derive(Debug, Clone)]
pub struct PkceSession {
    /// Random string (43 chars, base64url encoded), kept secret until token
    /// exchange
    pub code_verifier: String,

    /// SHA256 hash of `code_verifier` (base64url encoded), sent in the
    /// authorization request
    pub code_challenge: String,

    /// Random CSRF protection token, must match between authorization
    /// request and callback
    pub state: String,
}

impl PkceSession {
    /// Generate a new PKCE session with fresh random values
    ///
    /// # Examples
    /// ```
    /// use marketdesk_auth::pkce::PkceSession;
    ///
    /// let session = PkceSession::generate();
    /// assert_eq!(session.code_verifier.len(), 43);
    /// assert_eq!(session.challenge_method(), "S256");
    /// ```
    #[must_use]
    pub fn generate() -> Self {
        let code_verifier = generate_code_verifier();
        let code_challenge = generate_code_challenge(&code_verifier);
        let state = generate_state();

        Self { code_verifier, code_challenge, state }
    }

    /// Get the challenge method (always "S256" for SHA256)
    #[must_use]
    pub const fn challenge_method(&self) -> &'static str {
        "S256"
    }
}

/// Verifier and state read back from the session slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkceParams {
    /// Code verifier written at login initiation
    pub code_verifier: String,
    /// State nonce written at login initiation
    pub state: String,
}

/// Persist the verifier and state for the pending login
///
/// # Errors
/// Returns error if the session store cannot be written
pub fn store_pkce_params(
    store: &dyn KeyValueStore,
    verifier: &str,
    state: &str,
) -> Result<(), StoreError> {
    store.set(PKCE_VERIFIER_KEY, verifier)?;
    store.set(PKCE_STATE_KEY, state)
}

/// Read and delete the pending verifier and state
///
/// Both keys are deleted even when only one of them is present, so a
/// half-written session can never be completed later.
///
/// # Errors
/// Returns error if the session store cannot be read or written
pub fn retrieve_pkce_params(store: &dyn KeyValueStore) -> Result<Option<PkceParams>, StoreError> {
    let code_verifier = store.take(PKCE_VERIFIER_KEY)?;
    let state = store.take(PKCE_STATE_KEY)?;

    Ok(match (code_verifier, state) {
        (Some(code_verifier), Some(state)) => Some(PkceParams { code_verifier, state }),
        _ => None,
    })
}

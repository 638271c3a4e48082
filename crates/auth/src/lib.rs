//! MarketDesk OAuth 2.0 + PKCE authentication core
//!
//! This crate drives the authorization-code-with-PKCE login flow used by the
//! MarketDesk CRM, persists the resulting tokens, and keeps them fresh.
//!
//! # Features
//!
//! - **PKCE Flow**: RFC 7636 compliant Proof Key for Code Exchange
//! - **Callback Handling**: CSRF state validation before any token exchange
//! - **Just-in-time Refresh**: `get_access_token` refreshes expired tokens
//! - **Background Refresh**: a polling monitor refreshes tokens before expiry
//! - **Pluggable Storage**: memory, file and OS keychain key-value stores
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ TokenRefreshMonitor  │  Periodic poll + single-flight refresh
//! └──────────┬───────────┘
//!            │
//!            ▼
//! ┌──────────────────────┐
//! │      AuthClient      │  Login, callback, refresh, logout
//! └──────────┬───────────┘
//!            │
//!            ├──► TokenEndpoint     (form-encoded HTTP POSTs)
//!            ├──► KeyValueStore     (durable token slot)
//!            ├──► KeyValueStore     (volatile PKCE session)
//!            │
//!            └──► PKCE utilities    (verifier, challenge, state)
//! ```
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use marketdesk_auth::store::{FileStore, MemoryStore};
//! use marketdesk_auth::{AuthClient, AuthConfig, TokenRefreshMonitor};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AuthConfig::new(
//!     "marketdesk-web",
//!     "https://auth.example.com/authorize",
//!     "https://auth.example.com/token",
//!     "https://app.example.com/callback",
//! );
//!
//! let client = Arc::new(AuthClient::with_reqwest(
//!     config,
//!     Arc::new(FileStore::new(".marketdesk/tokens.json")),
//!     Arc::new(MemoryStore::new()),
//! )?);
//!
//! // Send the user to the authorization server
//! let navigation = client.initiate_login()?;
//! println!("Open {}", navigation.url);
//!
//! // ... the redirect comes back to the callback route ...
//! client.handle_callback("https://app.example.com/callback?code=abc&state=xyz").await?;
//!
//! // Keep tokens fresh in the background
//! let monitor = Arc::new(TokenRefreshMonitor::new(Arc::clone(&client)));
//! monitor.start();
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - **[`pkce`]**: verifier/challenge/state generation and the PKCE session slot
//! - **[`types`]**: `AuthTokens`, wire responses, navigation results
//! - **[`client`]**: the `AuthClient` state machine
//! - **[`endpoint`]**: the HTTP seam used for code exchange and refresh
//! - **[`monitor`]**: the `TokenRefreshMonitor`
//! - **[`store`]**: key-value store trait and implementations
//! - **[`config`]**: `AuthConfig` and its loader
//! - **[`error`]**: `AuthError` taxonomy

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod monitor;
pub mod pkce;
pub mod store;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types and functions
pub use client::AuthClient;
pub use config::{AuthConfig, LogoutScope};
pub use endpoint::{EndpointResponse, ReqwestTokenEndpoint, TokenEndpoint};
pub use error::{AuthError, AuthResult, ErrorClassification, ErrorSeverity};
pub use monitor::{MonitorEvent, RefreshOutcome, TokenRefreshMonitor};
pub use pkce::{
    generate_code_challenge, generate_code_verifier, generate_state, retrieve_pkce_params,
    store_pkce_params, validate_state, PkceParams, PkceSession,
};
pub use store::{KeyValueStore, StoreError};
pub use types::{AuthTokens, Navigation, TokenResponse};

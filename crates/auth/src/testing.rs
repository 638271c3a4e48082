//! Test doubles and fixtures for the auth flow
//!
//! Compiled for unit tests and, behind the `test-utils` feature, for
//! downstream crates that want to drive an [`AuthClient`] without a network.

// Test helpers panic on misuse; that is the failure signal.
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SubsecRound, TimeDelta, Utc};
use parking_lot::Mutex;

use crate::client::AuthClient;
use crate::config::AuthConfig;
use crate::endpoint::{EndpointResponse, TokenEndpoint};
use crate::error::{AuthError, AuthResult};
use crate::store::{KeyValueStore, MemoryStore, TOKENS_KEY};
use crate::types::AuthTokens;

/// A token endpoint call captured by [`MockTokenEndpoint`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Target URL
    pub url: String,
    /// Form parameters in send order
    pub params: Vec<(String, String)>,
}

impl RecordedCall {
    /// Value of the first form parameter named `name`
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Response(EndpointResponse),
    TransportError(String),
}

/// Scripted token endpoint
///
/// Replies are served in the order they were queued. Every call is recorded,
/// including calls made after the queue ran dry (those fail with
/// `AuthError::Http`).
#[derive(Debug, Default)]
pub struct MockTokenEndpoint {
    replies: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<RecordedCall>>,
    delay: Mutex<Option<Duration>>,
}

impl MockTokenEndpoint {
    /// Create an endpoint with an empty reply queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response with a raw body
    pub fn push_status(&self, status: u16, body: impl Into<String>) {
        self.replies
            .lock()
            .push_back(Reply::Response(EndpointResponse { status, body: body.into() }));
    }

    /// Queue a response with a JSON body
    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push_status(status, body.to_string());
    }

    /// Queue a transport failure
    pub fn push_transport_error(&self, message: impl Into<String>) {
        self.replies.lock().push_back(Reply::TransportError(message.into()));
    }

    /// Delay every reply by `delay` (uses `tokio::time`, so paused clocks apply)
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Number of calls received so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Snapshot of the calls received so far
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl TokenEndpoint for MockTokenEndpoint {
    async fn post_form(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> AuthResult<EndpointResponse> {
        self.calls.lock().push(RecordedCall {
            url: url.to_string(),
            params: params.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect(),
        });

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self.replies.lock().pop_front();
        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::TransportError(message)) => Err(AuthError::Http(message)),
            None => Err(AuthError::Http("no mock response queued".to_string())),
        }
    }
}

/// Configuration pointing at `auth.example.com`
#[must_use]
pub fn test_config() -> AuthConfig {
    AuthConfig::new(
        "marketdesk-web",
        "https://auth.example.com/authorize",
        "https://auth.example.com/token",
        "https://app.example.com/callback",
    )
}

/// Token set with access token `access-token` expiring `lifetime` from now
#[must_use]
pub fn tokens_expiring_in(lifetime: TimeDelta, refresh_token: Option<&str>) -> AuthTokens {
    AuthTokens {
        access_token: "access-token".to_string(),
        refresh_token: refresh_token.map(str::to_string),
        expires_at: (Utc::now() + lifetime).trunc_subsecs(3),
        token_type: "Bearer".to_string(),
    }
}

/// Client wired to in-memory stores and a [`MockTokenEndpoint`]
pub struct TestHarness {
    /// Client under test
    pub client: Arc<AuthClient>,
    /// Durable store behind the client
    pub durable: Arc<MemoryStore>,
    /// Session store behind the client
    pub session: Arc<MemoryStore>,
    /// Scripted token endpoint
    pub endpoint: Arc<MockTokenEndpoint>,
}

impl TestHarness {
    /// Harness using [`test_config`]
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    /// Harness using `config`
    #[must_use]
    pub fn with_config(config: AuthConfig) -> Self {
        let durable = Arc::new(MemoryStore::new());
        let session = Arc::new(MemoryStore::new());
        let endpoint = Arc::new(MockTokenEndpoint::new());
        let client = Arc::new(AuthClient::new(
            config,
            Arc::clone(&durable) as Arc<dyn KeyValueStore>,
            Arc::clone(&session) as Arc<dyn KeyValueStore>,
            Arc::clone(&endpoint) as Arc<dyn TokenEndpoint>,
        ));

        Self { client, durable, session, endpoint }
    }

    /// Write `tokens` straight into the durable slot
    pub fn store_tokens(&self, tokens: &AuthTokens) {
        let raw = serde_json::to_string(tokens).expect("tokens serialize");
        self.durable.set(TOKENS_KEY, &raw).expect("memory store write");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

//! HTTP seam for token endpoint calls
//!
//! The auth client only ever issues form-encoded POSTs and reads back a
//! status and a body. Abstracting that behind [`TokenEndpoint`] lets tests
//! count calls and replay canned responses without a network.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::error::{AuthError, AuthResult};

/// Raw response from a token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body text
    pub body: String,
}

impl EndpointResponse {
    /// Whether the status is 2xx
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Trait for token endpoint transport
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// POST `params` as `application/x-www-form-urlencoded` to `url`
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    ///
    /// # Errors
    /// Returns `AuthError::Http` on transport failure and
    /// `AuthError::Timeout` when the request exceeds the timeout
    async fn post_form(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> AuthResult<EndpointResponse>;
}

/// `reqwest`-backed token endpoint with an explicit request timeout
#[derive(Debug, Clone)]
pub struct ReqwestTokenEndpoint {
    client: Client,
    timeout: Duration,
}

impl ReqwestTokenEndpoint {
    /// Build a client whose requests time out after `timeout`
    ///
    /// # Errors
    /// Returns `AuthError::Http` if the underlying client cannot be built
    pub fn new(timeout: Duration) -> AuthResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Http(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    /// Configured request timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl TokenEndpoint for ReqwestTokenEndpoint {
    async fn post_form(
        &self,
        url: &str,
        params: &[(&'static str, String)],
    ) -> AuthResult<EndpointResponse> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                AuthError::Timeout(self.timeout)
            } else {
                AuthError::Http(e.to_string())
            }
        };

        let response = self.client.post(url).form(params).send().await.map_err(map_err)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_err)?;

        debug!(url = %url, status, "Token endpoint responded");

        Ok(EndpointResponse { status, body })
    }
}

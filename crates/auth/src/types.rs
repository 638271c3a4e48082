//! Authentication types and structures
//!
//! Defines the persisted token record, the token endpoint wire format, the
//! parsed callback query, and navigation instructions returned to the UI.

use std::fmt;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::AuthError;

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Persisted authentication state
///
/// Serialized as `{"accessToken", "refreshToken", "expiresAt", "tokenType"}`
/// with `expiresAt` in epoch milliseconds. The record is always written and
/// deleted as a whole.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthTokens {
    /// Bearer credential for API calls
    pub access_token: String,

    /// Credential for silent refresh; `None` means refresh is impossible
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Absolute expiry instant
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub expires_at: DateTime<Utc>,

    /// Token type (always "Bearer" for OAuth 2.0 unless the server says
    /// otherwise)
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

impl AuthTokens {
    /// Build a token set from a token endpoint response issued at `issued_at`
    ///
    /// `fallback_refresh_token` is kept when the response carries no refresh
    /// token (servers may choose not to rotate it). The expiry is truncated to
    /// the millisecond precision it is persisted with.
    #[must_use]
    pub fn from_response(
        response: TokenResponse,
        fallback_refresh_token: Option<String>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let lifetime = TimeDelta::try_seconds(response.expires_in.max(0)).unwrap_or(TimeDelta::MAX);
        let expires_at = issued_at
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
            .trunc_subsecs(3);

        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at,
            token_type: response.token_type.unwrap_or_else(default_token_type),
        }
    }

    /// Whether `expires_at` is strictly after `now`
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Time left until expiry, clamped to zero
    #[must_use]
    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }

    /// `Authorization` header value for this token
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for AuthTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// OAuth token response from the authorization server
///
/// Standard OAuth 2.0 token response format (RFC 6749 §5.1). Unknown fields
/// such as `scope` or `id_token` are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Newly issued access token
    pub access_token: String,
    /// Rotated refresh token, if the server issued one
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Token type, usually "Bearer"
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Instruction for the UI layer to navigate the user agent
///
/// Returned instead of performing a redirect so the flow stays testable
/// outside a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    /// Absolute or app-relative URL to navigate to
    pub url: String,
}

impl Navigation {
    /// Create a navigation instruction
    pub fn to(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Query parameters of an authorization redirect
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// Echoed CSRF state
    pub state: Option<String>,
    /// Provider error code
    pub error: Option<String>,
    /// Provider error description
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse the callback URL handed over by the callback route
    ///
    /// Accepts absolute URLs and app-relative ones (`/callback?code=..`).
    /// Empty parameter values count as absent.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidCallbackUrl` if the URL cannot be parsed
    pub fn parse(callback_url: &str) -> Result<Self, AuthError> {
        let url = match Url::parse(callback_url) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse("http://localhost")
                .and_then(|base| base.join(callback_url))
                .map_err(|e| AuthError::InvalidCallbackUrl(e.to_string()))?,
            Err(e) => return Err(AuthError::InvalidCallbackUrl(e.to_string())),
        };

        let mut params = Self::default();
        for (key, value) in url.query_pairs() {
            if value.is_empty() {
                continue;
            }
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }

        Ok(params)
    }
}

//! Authentication error taxonomy
//!
//! Every failure of the login, callback, refresh and logout paths is an
//! [`AuthError`]. Errors are surfaced to the UI boundary, which renders
//! [`AuthError::user_message`]; the token refresh monitor is the only
//! component that swallows errors, converting refresh failures into a
//! forced logout.
//!
//! Errors are classified the same way across the workspace:
//!
//! | Variant | Severity | Retryable |
//! |---------|----------|-----------|
//! | `OAuthProvider`, `MissingAuthorizationCode` | Warning | yes |
//! | `MissingVerifier` | Info | yes |
//! | `StateMismatch` | Critical | no |
//! | `TokenExchange`, `TokenRefresh` | Error | no |
//! | `Http`, `Timeout` | Warning | yes |
//! | `Store`, `Config`, `InvalidTokenResponse` | Error | no |

use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Result alias for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

/// Error type for authentication operations
#[derive(Debug, Error)]
pub enum AuthError {
    /// The authorization server redirected back with an `error` parameter
    #[error("Authorization server returned error: {error}")]
    OAuthProvider {
        /// The `error` query value, verbatim
        error: String,
        /// Optional `error_description` query value
        description: Option<String>,
    },

    /// Callback URL carried no `code` parameter
    #[error("Callback URL is missing the authorization code")]
    MissingAuthorizationCode,

    /// No PKCE session was found at callback time
    #[error("No PKCE verifier found for this login attempt")]
    MissingVerifier,

    /// Returned `state` did not match the stored one (possible CSRF)
    #[error("State parameter mismatch")]
    StateMismatch,

    /// Token endpoint answered a code exchange with a non-2xx status
    #[error("Token exchange failed with status {status}: {body}")]
    TokenExchange {
        /// HTTP status code
        status: u16,
        /// Response body text, for diagnostics
        body: String,
    },

    /// Refresh endpoint answered with a non-2xx status
    #[error("Token refresh failed with status {status}: {body}")]
    TokenRefresh {
        /// HTTP status code
        status: u16,
        /// Response body text, for diagnostics
        body: String,
    },

    /// A refresh was requested but the stored token set has no refresh token
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The callback URL could not be parsed
    #[error("Invalid callback URL: {0}")]
    InvalidCallbackUrl(String),

    /// A 2xx token response body could not be decoded
    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The HTTP call exceeded the configured timeout
    #[error("HTTP request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Key-value store failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuthError {
    /// Message suitable for rendering at the UI boundary.
    ///
    /// Never includes response bodies or token material.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::OAuthProvider { error, .. } => format!("Login failed: {error}"),
            Self::MissingAuthorizationCode => {
                "Login failed: no authorization code was returned".to_string()
            }
            Self::MissingVerifier => "Session expired, please try again".to_string(),
            Self::StateMismatch => {
                "Security check failed. Please start the login again".to_string()
            }
            Self::TokenExchange { .. } | Self::InvalidTokenResponse(_) => {
                "Login failed: could not obtain an access token".to_string()
            }
            Self::TokenRefresh { .. } | Self::NoRefreshToken => {
                "Your session has ended, please log in again".to_string()
            }
            Self::Http(_) | Self::Timeout(_) => {
                "Could not reach the authentication server".to_string()
            }
            Self::InvalidCallbackUrl(_) => "Login failed: invalid redirect".to_string(),
            Self::Store(_) | Self::Config(_) => "Authentication is unavailable".to_string(),
        }
    }
}

/// Standard interface for classifying errors by their characteristics
pub trait ErrorClassification {
    /// Whether the user may simply try the same action again
    fn is_retryable(&self) -> bool;

    /// Severity level used for logging decisions
    fn severity(&self) -> ErrorSeverity;

    /// Whether this error indicates a security or integrity problem
    fn is_critical(&self) -> bool;
}

impl ErrorClassification for AuthError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::OAuthProvider { .. }
                | Self::MissingAuthorizationCode
                | Self::MissingVerifier
                | Self::Http(_)
                | Self::Timeout(_)
        )
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::MissingVerifier => ErrorSeverity::Info,
            Self::OAuthProvider { .. }
            | Self::MissingAuthorizationCode
            | Self::InvalidCallbackUrl(_)
            | Self::Http(_)
            | Self::Timeout(_) => ErrorSeverity::Warning,
            Self::TokenExchange { .. }
            | Self::TokenRefresh { .. }
            | Self::NoRefreshToken
            | Self::InvalidTokenResponse(_)
            | Self::Store(_)
            | Self::Config(_) => ErrorSeverity::Error,
            Self::StateMismatch => ErrorSeverity::Critical,
        }
    }

    fn is_critical(&self) -> bool {
        self.severity() == ErrorSeverity::Critical
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for error classification.
    use super::*;

    #[test]
    fn state_mismatch_is_critical_and_not_retryable() {
        let err = AuthError::StateMismatch;
        assert!(err.is_critical());
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn missing_verifier_reads_as_expired_session() {
        let err = AuthError::MissingVerifier;
        assert_eq!(err.user_message(), "Session expired, please try again");
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert!(err.is_retryable());
    }

    #[test]
    fn provider_error_surfaces_value_verbatim() {
        let err = AuthError::OAuthProvider {
            error: "access_denied".to_string(),
            description: Some("User cancelled".to_string()),
        };
        assert_eq!(err.to_string(), "Authorization server returned error: access_denied");
        assert_eq!(err.user_message(), "Login failed: access_denied");
    }

    #[test]
    fn exchange_error_keeps_body_for_diagnostics_only() {
        let err =
            AuthError::TokenExchange { status: 400, body: "{\"error\":\"invalid_grant\"}".into() };
        assert!(err.to_string().contains("invalid_grant"));
        assert!(!err.user_message().contains("invalid_grant"));
    }

    #[test]
    fn severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Warning.to_string(), "WARN");
    }
}

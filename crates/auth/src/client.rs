//! OAuth 2.0 authorization-code + PKCE client
//!
//! Drives the login flow and owns the authentication state:
//!
//! ```text
//! Unauthenticated ── initiate_login ──► AwaitingCallback
//! AwaitingCallback ── handle_callback ─► Authenticated | Error
//! Authenticated ── get_access_token (expired) ─► Authenticated | Unauthenticated
//! Authenticated ── logout ─────────────► Unauthenticated
//! ```
//!
//! Navigation (login redirect, post-logout redirect) is returned to the
//! caller as a [`Navigation`] instead of being performed here.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{AuthConfig, LogoutScope};
use crate::endpoint::{EndpointResponse, ReqwestTokenEndpoint, TokenEndpoint};
use crate::error::{AuthError, AuthResult};
use crate::pkce::{retrieve_pkce_params, store_pkce_params, validate_state, PkceSession};
use crate::store::{KeyValueStore, PKCE_STATE_KEY, PKCE_VERIFIER_KEY, TOKENS_KEY};
use crate::types::{AuthTokens, CallbackParams, Navigation, TokenResponse};

/// OAuth 2.0 client with PKCE support
///
/// Holds two stores: a durable one for the token record and a volatile one
/// for the PKCE session of the login attempt in flight.
pub struct AuthClient {
    config: AuthConfig,
    durable: Arc<dyn KeyValueStore>,
    session: Arc<dyn KeyValueStore>,
    endpoint: Arc<dyn TokenEndpoint>,
}

impl AuthClient {
    /// Create a client from its collaborators
    pub fn new(
        config: AuthConfig,
        durable: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
        endpoint: Arc<dyn TokenEndpoint>,
    ) -> Self {
        Self { config, durable, session, endpoint }
    }

    /// Create a client talking to the configured endpoints over `reqwest`
    ///
    /// # Errors
    /// Returns `AuthError::Http` if the HTTP client cannot be built
    pub fn with_reqwest(
        config: AuthConfig,
        durable: Arc<dyn KeyValueStore>,
        session: Arc<dyn KeyValueStore>,
    ) -> AuthResult<Self> {
        let endpoint = ReqwestTokenEndpoint::new(config.http_timeout())?;
        Ok(Self::new(config, durable, session, Arc::new(endpoint)))
    }

    /// Get a reference to the configuration
    #[must_use]
    pub const fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Start a login attempt
    ///
    /// Generates fresh PKCE material, stores the verifier and state in the
    /// session store (replacing any abandoned attempt), and returns the
    /// authorization URL the user agent must be sent to.
    ///
    /// # Errors
    /// Returns `AuthError::Store` if the PKCE session cannot be stored
    pub fn initiate_login(&self) -> AuthResult<Navigation> {
        let pkce = PkceSession::generate();
        store_pkce_params(self.session.as_ref(), &pkce.code_verifier, &pkce.state)?;

        let mut params = vec![
            ("response_type", "code".to_string()),
            ("client_id", self.config.client_id.clone()),
            ("redirect_uri", self.config.redirect_uri.clone()),
            ("scope", self.config.scope.clone()),
            ("state", pkce.state.clone()),
            ("code_challenge", pkce.code_challenge.clone()),
            ("code_challenge_method", pkce.challenge_method().to_string()),
        ];
        params.extend(
            self.config.extra_authorize_params.iter().map(|(k, v)| (k.as_str(), v.clone())),
        );

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let separator = if self.config.authorization_endpoint.contains('?') { '&' } else { '?' };
        let url = format!("{}{separator}{query_string}", self.config.authorization_endpoint);

        info!("Generated authorization URL, awaiting callback");

        Ok(Navigation::to(url))
    }

    /// Complete a login attempt from the redirect URL
    ///
    /// Checks run in a fixed order: provider error, missing code, PKCE
    /// session lookup (destructive), state comparison. Only after all of them
    /// pass is the token endpoint called.
    ///
    /// # Errors
    /// - `OAuthProvider` if the redirect carries an `error` parameter
    /// - `MissingAuthorizationCode` if there is no `code`
    /// - `MissingVerifier` if no PKCE session exists (expired or replayed)
    /// - `StateMismatch` if the returned state differs from the stored one
    /// - `TokenExchange` on a non-2xx token endpoint response
    pub async fn handle_callback(&self, callback_url: &str) -> AuthResult<AuthTokens> {
        let params = CallbackParams::parse(callback_url)?;

        if let Some(error) = params.error {
            warn!(error = %error, "Authorization server returned an error");
            return Err(AuthError::OAuthProvider { error, description: params.error_description });
        }

        let code = params.code.ok_or(AuthError::MissingAuthorizationCode)?;

        let pkce = retrieve_pkce_params(self.session.as_ref())?.ok_or_else(|| {
            warn!("Callback received without a pending PKCE session");
            AuthError::MissingVerifier
        })?;

        let state_matches =
            params.state.as_deref().is_some_and(|state| validate_state(&pkce.state, state));
        if !state_matches {
            warn!("State mismatch on callback, aborting before token exchange");
            return Err(AuthError::StateMismatch);
        }

        let form = [
            ("grant_type", "authorization_code".to_string()),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.clone()),
            ("client_id", self.config.client_id.clone()),
            ("code_verifier", pkce.code_verifier),
        ];

        let response = self.endpoint.post_form(&self.config.token_endpoint, &form).await?;
        if !response.is_success() {
            warn!(status = response.status, "Authorization code exchange rejected");
            return Err(AuthError::TokenExchange { status: response.status, body: response.body });
        }

        let tokens = AuthTokens::from_response(parse_token_response(&response)?, None, Utc::now());
        self.persist_tokens(&tokens)?;

        info!(expires_at = %tokens.expires_at, "Login completed");

        Ok(tokens)
    }

    /// Exchange a refresh token for a new token set
    ///
    /// On success the whole record is replaced in one write; the previous
    /// refresh token is kept if the server did not rotate it. On failure
    /// nothing is written.
    ///
    /// # Errors
    /// - `NoRefreshToken` if `refresh_token` is empty
    /// - `TokenRefresh` on a non-2xx response
    /// - `Http`/`Timeout` on transport failure
    pub async fn refresh_access_token(&self, refresh_token: &str) -> AuthResult<AuthTokens> {
        if refresh_token.is_empty() {
            return Err(AuthError::NoRefreshToken);
        }

        let form = [
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.to_string()),
            ("client_id", self.config.client_id.clone()),
        ];

        let response = self.endpoint.post_form(self.config.refresh_url(), &form).await?;
        if !response.is_success() {
            warn!(status = response.status, "Token refresh rejected");
            return Err(AuthError::TokenRefresh { status: response.status, body: response.body });
        }

        let tokens = AuthTokens::from_response(
            parse_token_response(&response)?,
            Some(refresh_token.to_string()),
            Utc::now(),
        );
        self.persist_tokens(&tokens)?;

        info!(expires_at = %tokens.expires_at, "Access token refreshed");

        Ok(tokens)
    }

    /// Whether a token set exists and has not expired
    ///
    /// Pure read: never refreshes or touches the network. Unreadable state
    /// counts as unauthenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.stored_tokens().is_some_and(|tokens| tokens.is_valid_at(Utc::now()))
    }

    /// Current access token, refreshing it first if it has expired
    ///
    /// Returns `None` when unauthenticated. A failed refresh clears the
    /// stored tokens and also returns `None`.
    pub async fn get_access_token(&self) -> Option<String> {
        let tokens = self.stored_tokens()?;

        if tokens.is_valid_at(Utc::now()) {
            return Some(tokens.access_token);
        }

        let Some(refresh_token) = tokens.refresh_token else {
            debug!("Access token expired and no refresh token is stored");
            return None;
        };

        match self.refresh_access_token(&refresh_token).await {
            Ok(refreshed) => Some(refreshed.access_token),
            Err(e) => {
                warn!(error = %e, "Just-in-time refresh failed, clearing tokens");
                if let Err(clear_err) = self.clear_tokens() {
                    warn!(error = %clear_err, "Failed to clear tokens after refresh failure");
                }
                None
            }
        }
    }

    /// `Authorization` header value for the current access token
    pub async fn authorization_header(&self) -> Option<String> {
        self.get_access_token().await?;
        self.stored_tokens().map(|tokens| tokens.authorization_header())
    }

    /// Stored token set, without any refresh
    #[must_use]
    pub fn stored_tokens(&self) -> Option<AuthTokens> {
        let raw = match self.durable.get(TOKENS_KEY) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(error = %e, "Failed to read stored tokens");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(tokens) => Some(tokens),
            Err(e) => {
                warn!(error = %e, "Stored token record is unreadable");
                None
            }
        }
    }

    /// Delete the stored token set
    ///
    /// # Errors
    /// Returns `AuthError::Store` if the durable store cannot be written
    pub fn clear_tokens(&self) -> AuthResult<()> {
        self.durable.delete(TOKENS_KEY)?;
        debug!("Stored tokens cleared");
        Ok(())
    }

    /// Log out and return the navigation to the application root
    ///
    /// Every deletion is attempted even if an earlier one fails; the first
    /// failure is reported afterwards. Safe to call when already logged out.
    ///
    /// # Errors
    /// Returns `AuthError::Store` if any store could not be cleared
    pub fn logout(&self) -> AuthResult<Navigation> {
        let results = match self.config.logout_scope {
            LogoutScope::All => vec![self.durable.clear(), self.session.clear()],
            LogoutScope::AuthOnly => vec![
                self.durable.delete(TOKENS_KEY),
                self.session.delete(PKCE_VERIFIER_KEY),
                self.session.delete(PKCE_STATE_KEY),
            ],
        };

        let mut first_error = None;
        for result in results {
            if let Err(e) = result {
                warn!(error = %e, "Failed to clear state during logout");
                first_error.get_or_insert(e);
            }
        }

        info!(scope = ?self.config.logout_scope, "Logged out");

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(self.root_navigation()),
        }
    }

    /// Navigation to the application root
    #[must_use]
    pub fn root_navigation(&self) -> Navigation {
        Navigation::to(self.config.app_base_url.clone())
    }

    fn persist_tokens(&self, tokens: &AuthTokens) -> AuthResult<()> {
        let serialized = serde_json::to_string(tokens)
            .map_err(|e| AuthError::InvalidTokenResponse(e.to_string()))?;
        self.durable.set(TOKENS_KEY, &serialized)?;
        Ok(())
    }
}

fn parse_token_response(response: &EndpointResponse) -> AuthResult<TokenResponse> {
    serde_json::from_str(&response.body).map_err(|e| AuthError::InvalidTokenResponse(e.to_string()))
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("client_id", &self.config.client_id)
            .field("token_endpoint", &self.config.token_endpoint)
            .finish_non_exhaustive()
    }
}

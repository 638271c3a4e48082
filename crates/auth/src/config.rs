//! Authentication configuration and loader
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes the working directory and its parent for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! Required:
//! - `MARKETDESK_AUTH_CLIENT_ID`
//! - `MARKETDESK_AUTH_AUTHORIZATION_ENDPOINT`
//! - `MARKETDESK_AUTH_TOKEN_ENDPOINT`
//! - `MARKETDESK_AUTH_REDIRECT_URI`
//!
//! Optional:
//! - `MARKETDESK_AUTH_REFRESH_ENDPOINT`: defaults to the token endpoint
//! - `MARKETDESK_AUTH_SCOPE`: defaults to `openid`
//! - `MARKETDESK_AUTH_APP_BASE_URL`: logout destination, defaults to `/`
//! - `MARKETDESK_AUTH_HTTP_TIMEOUT_SECS`: defaults to 30
//! - `MARKETDESK_AUTH_POLL_INTERVAL_SECS`: defaults to 300
//! - `MARKETDESK_AUTH_REFRESH_THRESHOLD_SECS`: defaults to 600
//! - `MARKETDESK_AUTH_LOGOUT_SCOPE`: `all` (default) or `auth_only`
//!
//! ## File Locations
//! `marketdesk-auth.toml`, `marketdesk-auth.json`, then the same names in
//! the parent directory.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AuthError, AuthResult};

const ENV_PREFIX: &str = "MARKETDESK_AUTH_";

/// What `logout` removes from the durable store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutScope {
    /// Wipe every key in the durable and session stores
    #[default]
    All,
    /// Remove only the token record and PKCE session keys
    AuthOnly,
}

impl FromStr for LogoutScope {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "auth_only" | "auth-only" => Ok(Self::AuthOnly),
            other => Err(AuthError::Config(format!("Unknown logout scope: {other}"))),
        }
    }
}

fn default_scope() -> String {
    "openid".to_string()
}

fn default_app_base_url() -> String {
    "/".to_string()
}

const fn default_http_timeout_secs() -> u64 {
    30
}

const fn default_poll_interval_secs() -> u64 {
    300
}

const fn default_refresh_threshold_secs() -> u64 {
    600
}

/// OAuth client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth client ID (public client, no secret)
    pub client_id: String,

    /// Authorization endpoint the user agent is sent to
    pub authorization_endpoint: String,

    /// Token endpoint for the authorization code exchange
    pub token_endpoint: String,

    /// Refresh endpoint; falls back to `token_endpoint`
    #[serde(default)]
    pub refresh_endpoint: Option<String>,

    /// Redirect URI registered for the callback route
    pub redirect_uri: String,

    /// Requested scope
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Where logout sends the user
    #[serde(default = "default_app_base_url")]
    pub app_base_url: String,

    /// Timeout applied to every token endpoint call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Token refresh monitor poll period
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Refresh when fewer than this many seconds remain
    #[serde(default = "default_refresh_threshold_secs")]
    pub refresh_threshold_secs: u64,

    /// What logout removes
    #[serde(default)]
    pub logout_scope: LogoutScope,

    /// Additional authorization request parameters (e.g. `audience`)
    #[serde(default)]
    pub extra_authorize_params: Vec<(String, String)>,
}

impl AuthConfig {
    /// Create a configuration with defaults for every optional field
    ///
    /// # Examples
    /// ```
    /// use marketdesk_auth::AuthConfig;
    ///
    /// let config = AuthConfig::new(
    ///     "marketdesk-web",
    ///     "https://auth.example.com/authorize",
    ///     "https://auth.example.com/token",
    ///     "https://app.example.com/callback",
    /// );
    /// assert_eq!(config.scope, "openid");
    /// assert_eq!(config.refresh_url(), "https://auth.example.com/token");
    /// ```
    pub fn new(
        client_id: impl Into<String>,
        authorization_endpoint: impl Into<String>,
        token_endpoint: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            authorization_endpoint: authorization_endpoint.into(),
            token_endpoint: token_endpoint.into(),
            refresh_endpoint: None,
            redirect_uri: redirect_uri.into(),
            scope: default_scope(),
            app_base_url: default_app_base_url(),
            http_timeout_secs: default_http_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            refresh_threshold_secs: default_refresh_threshold_secs(),
            logout_scope: LogoutScope::default(),
            extra_authorize_params: Vec::new(),
        }
    }

    /// URL used for refresh-token grants
    #[must_use]
    pub fn refresh_url(&self) -> &str {
        self.refresh_endpoint.as_deref().unwrap_or(&self.token_endpoint)
    }

    /// HTTP timeout as a `Duration`
    #[must_use]
    pub const fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Monitor poll period as a `Duration`
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Monitor refresh threshold as a `Duration`
    #[must_use]
    pub const fn refresh_threshold(&self) -> Duration {
        Duration::from_secs(self.refresh_threshold_secs)
    }

    /// Check the configuration for values the flow cannot work with
    ///
    /// # Errors
    /// Returns `AuthError::Config` for an empty client id, a non-absolute
    /// endpoint or redirect URI, or zero durations
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Config("client_id must not be empty".to_string()));
        }

        let mut urls = vec![
            ("authorization_endpoint", self.authorization_endpoint.as_str()),
            ("token_endpoint", self.token_endpoint.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];
        if let Some(refresh) = &self.refresh_endpoint {
            urls.push(("refresh_endpoint", refresh.as_str()));
        }
        for (field, value) in urls {
            Url::parse(value)
                .map_err(|e| AuthError::Config(format!("Invalid {field} '{value}': {e}")))?;
        }

        if self.http_timeout_secs == 0 || self.poll_interval_secs == 0 {
            return Err(AuthError::Config(
                "http_timeout_secs and poll_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `AuthError::Config` if configuration cannot be loaded from either
/// source, or the loaded configuration fails validation
pub fn load() -> AuthResult<AuthConfig> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Auth configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load auth config from environment, trying file");
            load_from_file(None)?
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from the process environment
///
/// # Errors
/// Returns `AuthError::Config` if required variables are missing or have
/// invalid values
pub fn load_from_env() -> AuthResult<AuthConfig> {
    load_from_env_with(|name| std::env::var(name).ok())
}

/// Load configuration using `lookup` to resolve variable names
///
/// # Errors
/// Returns `AuthError::Config` if required variables are missing or have
/// invalid values
pub fn load_from_env_with<F>(lookup: F) -> AuthResult<AuthConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|v| !v.is_empty());
    let required = |suffix: &str| {
        var(suffix).ok_or_else(|| AuthError::Config(format!("{ENV_PREFIX}{suffix} is not set")))
    };
    let seconds = |suffix: &str, default: u64| -> AuthResult<u64> {
        var(suffix).map_or(Ok(default), |raw| {
            raw.parse::<u64>().map_err(|e| {
                AuthError::Config(format!("Invalid {ENV_PREFIX}{suffix} '{raw}': {e}"))
            })
        })
    };

    let mut config = AuthConfig::new(
        required("CLIENT_ID")?,
        required("AUTHORIZATION_ENDPOINT")?,
        required("TOKEN_ENDPOINT")?,
        required("REDIRECT_URI")?,
    );

    config.refresh_endpoint = var("REFRESH_ENDPOINT");
    if let Some(scope) = var("SCOPE") {
        config.scope = scope;
    }
    if let Some(base) = var("APP_BASE_URL") {
        config.app_base_url = base;
    }
    config.http_timeout_secs = seconds("HTTP_TIMEOUT_SECS", default_http_timeout_secs())?;
    config.poll_interval_secs = seconds("POLL_INTERVAL_SECS", default_poll_interval_secs())?;
    config.refresh_threshold_secs =
        seconds("REFRESH_THRESHOLD_SECS", default_refresh_threshold_secs())?;
    if let Some(scope) = var("LOGOUT_SCOPE") {
        config.logout_scope = scope.parse()?;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations.
///
/// # Errors
/// Returns `AuthError::Config` if the file is missing, unreadable or invalid
pub fn load_from_file(path: Option<PathBuf>) -> AuthResult<AuthConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(AuthError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            AuthError::Config("No auth config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading auth configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| AuthError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content, format chosen by extension
///
/// # Errors
/// Returns `AuthError::Config` if the format is unsupported or parsing fails
pub fn parse_config(contents: &str, path: &Path) -> AuthResult<AuthConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| AuthError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| AuthError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(AuthError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a config file
#[must_use]
pub fn probe_config_paths() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    [
        cwd.join("marketdesk-auth.toml"),
        cwd.join("marketdesk-auth.json"),
        cwd.join("../marketdesk-auth.toml"),
        cwd.join("../marketdesk-auth.json"),
    ]
    .into_iter()
    .find(|candidate| candidate.is_file())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn sample() -> AuthConfig {
        AuthConfig::new(
            "marketdesk-web",
            "https://auth.example.com/authorize",
            "https://auth.example.com/token",
            "https://app.example.com/callback",
        )
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: [(&str, &str); 4] = [
        ("MARKETDESK_AUTH_CLIENT_ID", "marketdesk-web"),
        ("MARKETDESK_AUTH_AUTHORIZATION_ENDPOINT", "https://auth.example.com/authorize"),
        ("MARKETDESK_AUTH_TOKEN_ENDPOINT", "https://auth.example.com/token"),
        ("MARKETDESK_AUTH_REDIRECT_URI", "https://app.example.com/callback"),
    ];

    #[test]
    fn defaults_match_reference_timings() {
        let config = sample();
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert_eq!(config.poll_interval(), Duration::from_secs(5 * 60));
        assert_eq!(config.refresh_threshold(), Duration::from_secs(10 * 60));
        assert_eq!(config.logout_scope, LogoutScope::All);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn refresh_url_prefers_dedicated_endpoint() {
        let mut config = sample();
        config.refresh_endpoint = Some("https://auth.example.com/refresh".into());
        assert_eq!(config.refresh_url(), "https://auth.example.com/refresh");
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = sample();
        config.client_id = "  ".into();
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let mut config = sample();
        config.token_endpoint = "/token".into();
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));

        let mut config = sample();
        config.poll_interval_secs = 0;
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn env_loader_reads_required_and_optional_values() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MARKETDESK_AUTH_POLL_INTERVAL_SECS", "60"));
        pairs.push(("MARKETDESK_AUTH_LOGOUT_SCOPE", "auth_only"));

        let config = load_from_env_with(env(&pairs)).unwrap();
        assert_eq!(config.client_id, "marketdesk-web");
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.refresh_threshold_secs, 600);
        assert_eq!(config.logout_scope, LogoutScope::AuthOnly);
    }

    #[test]
    fn env_loader_reports_missing_variable() {
        let err = load_from_env_with(env(&REQUIRED[..3])).unwrap_err();
        assert!(err.to_string().contains("MARKETDESK_AUTH_REDIRECT_URI"));
    }

    #[test]
    fn env_loader_rejects_bad_numbers() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("MARKETDESK_AUTH_HTTP_TIMEOUT_SECS", "soon"));
        assert!(matches!(load_from_env_with(env(&pairs)), Err(AuthError::Config(_))));
    }

    #[test]
    fn parses_toml_with_defaults() {
        let toml = r#"
            client_id = "marketdesk-web"
            authorization_endpoint = "https://auth.example.com/authorize"
            token_endpoint = "https://auth.example.com/token"
            redirect_uri = "https://app.example.com/callback"
            logout_scope = "auth_only"
        "#;
        let config = parse_config(toml, Path::new("marketdesk-auth.toml")).unwrap();
        assert_eq!(config.scope, "openid");
        assert_eq!(config.logout_scope, LogoutScope::AuthOnly);
    }

    #[test]
    fn parses_json_and_rejects_unknown_extension() {
        let json = serde_json::to_string(&sample()).unwrap();
        let config = parse_config(&json, Path::new("marketdesk-auth.json")).unwrap();
        assert_eq!(config, sample());

        assert!(parse_config(&json, Path::new("marketdesk-auth.yaml")).is_err());
    }

    #[test]
    fn load_from_missing_file_fails() {
        let result = load_from_file(Some(PathBuf::from("/definitely/not/here.toml")));
        assert!(matches!(result, Err(AuthError::Config(_))));
    }
}

//! Integration tests for the login flow
//!
//! Drives `AuthClient` against a `wiremock` authorization server over real
//! HTTP, with tokens persisted in a file store.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use marketdesk_auth::store::{FileStore, MemoryStore, PKCE_VERIFIER_KEY, TOKENS_KEY};
use marketdesk_auth::{AuthClient, AuthConfig, AuthError, AuthTokens, KeyValueStore, Navigation};
use serde_json::json;
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Fixture {
    server: MockServer,
    client: AuthClient,
    session: Arc<MemoryStore>,
    token_file: std::path::PathBuf,
    _dir: TempDir,
}

impl Fixture {
    async fn start() -> Self {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        let token_file = dir.path().join("tokens.json");
        let session = Arc::new(MemoryStore::new());

        let client = AuthClient::with_reqwest(
            config_for(&server),
            Arc::new(FileStore::new(&token_file)),
            Arc::clone(&session) as Arc<dyn KeyValueStore>,
        )
        .unwrap();

        Self { server, client, session, token_file, _dir: dir }
    }

    /// A second client sharing the token file, as after an app restart
    fn restarted_client(&self) -> AuthClient {
        AuthClient::with_reqwest(
            config_for(&self.server),
            Arc::new(FileStore::new(&self.token_file)),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    fn seed_tokens(&self, tokens: &AuthTokens) {
        FileStore::new(&self.token_file)
            .set(TOKENS_KEY, &serde_json::to_string(tokens).unwrap())
            .unwrap();
    }
}

fn config_for(server: &MockServer) -> AuthConfig {
    AuthConfig::new(
        "marketdesk-web",
        format!("{}/authorize", server.uri()),
        format!("{}/token", server.uri()),
        "https://app.example.com/callback",
    )
}

fn state_of(navigation: &Navigation) -> String {
    Url::parse(&navigation.url)
        .unwrap()
        .query_pairs()
        .find(|(k, _)| k == "state")
        .map(|(_, v)| v.into_owned())
        .unwrap()
}

fn expired_tokens(refresh_token: &str) -> AuthTokens {
    AuthTokens {
        access_token: "stale".to_string(),
        refresh_token: Some(refresh_token.to_string()),
        expires_at: Utc::now() - TimeDelta::seconds(5),
        token_type: "Bearer".to_string(),
    }
}

/// Validates the complete authorization-code exchange.
///
/// # Test Steps
/// 1. Initiate login and read the state from the authorization URL
/// 2. Serve a token response that only matches the stored verifier
/// 3. Complete the callback and check the expiry arithmetic
/// 4. Confirm a restarted client sees the persisted tokens
#[tokio::test]
async fn test_end_to_end_login() {
    let fixture = Fixture::start().await;

    let navigation = fixture.client.initiate_login().unwrap();
    assert!(navigation.url.starts_with(&format!("{}/authorize?", fixture.server.uri())));
    let state = state_of(&navigation);
    let verifier = fixture.session.get(PKCE_VERIFIER_KEY).unwrap().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=ABC123"))
        .and(body_string_contains(format!("code_verifier={verifier}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok1",
            "refresh_token": "ref1",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&fixture.server)
        .await;

    let before = Utc::now();
    let tokens = fixture
        .client
        .handle_callback(&format!("https://app.example.com/callback?code=ABC123&state={state}"))
        .await
        .unwrap();

    let lifetime_ms = (tokens.expires_at - before).num_milliseconds();
    assert!((3_599_000..3_605_000).contains(&lifetime_ms), "lifetime was {lifetime_ms} ms");
    assert_eq!(tokens.refresh_token.as_deref(), Some("ref1"));

    let restarted = fixture.restarted_client();
    assert!(restarted.is_authenticated());
    assert_eq!(restarted.get_access_token().await.as_deref(), Some("tok1"));
}

/// Validates that a forged state never reaches the token endpoint.
///
/// # Test Steps
/// 1. Initiate login
/// 2. Mount a token endpoint that must receive zero calls
/// 3. Deliver a callback with a different state and expect `StateMismatch`
#[tokio::test]
async fn test_state_mismatch_never_calls_token_endpoint() {
    let fixture = Fixture::start().await;
    fixture.client.initiate_login().unwrap();

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&fixture.server)
        .await;

    let result = fixture
        .client
        .handle_callback("https://app.example.com/callback?code=ABC123&state=forged")
        .await;

    assert!(matches!(result, Err(AuthError::StateMismatch)));
    assert!(!fixture.client.is_authenticated());
}

/// Validates that a provider error leaves the pending login untouched.
///
/// # Test Steps
/// 1. Initiate login
/// 2. Deliver `error=access_denied`
/// 3. Confirm the PKCE session survives for a retry of the same attempt
#[tokio::test]
async fn test_provider_error_keeps_pending_session() {
    let fixture = Fixture::start().await;
    fixture.client.initiate_login().unwrap();

    let result = fixture
        .client
        .handle_callback(concat!(
            "https://app.example.com/callback",
            "?error=access_denied&error_description=User%20cancelled"
        ))
        .await;

    match result {
        Err(AuthError::OAuthProvider { error, description }) => {
            assert_eq!(error, "access_denied");
            assert_eq!(description.as_deref(), Some("User cancelled"));
        }
        other => panic!("expected OAuthProvider, got {other:?}"),
    }
    assert_eq!(fixture.session.len(), 2);
}

/// Validates just-in-time refresh of an expired token over HTTP.
///
/// # Test Steps
/// 1. Seed an expired token set
/// 2. Serve a refresh response without a rotated refresh token
/// 3. Confirm exactly one call and retention of the old refresh token
#[tokio::test]
async fn test_expired_token_refreshes_once() {
    let fixture = Fixture::start().await;
    fixture.seed_tokens(&expired_tokens("ref1"));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=ref1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok2", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&fixture.server)
        .await;

    assert_eq!(fixture.client.get_access_token().await.as_deref(), Some("tok2"));
    assert_eq!(fixture.client.get_access_token().await.as_deref(), Some("tok2"));

    let stored = fixture.client.stored_tokens().unwrap();
    assert_eq!(stored.refresh_token.as_deref(), Some("ref1"));
}

/// Validates that a rejected refresh clears the token slot.
///
/// # Test Steps
/// 1. Seed an expired token set
/// 2. Reject the refresh with `400 invalid_grant`
/// 3. Confirm `None` is returned and the file no longer holds tokens
#[tokio::test]
async fn test_rejected_refresh_clears_tokens() {
    let fixture = Fixture::start().await;
    fixture.seed_tokens(&expired_tokens("revoked"));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})),
        )
        .expect(1)
        .mount(&fixture.server)
        .await;

    assert_eq!(fixture.client.get_access_token().await, None);
    assert!(fixture.restarted_client().stored_tokens().is_none());
}

/// Validates logout against the file store.
///
/// # Test Steps
/// 1. Seed tokens and log out
/// 2. Confirm the navigation target and that a restart sees no session
/// 3. Log out again to confirm idempotence
#[tokio::test]
async fn test_logout_clears_persisted_state() {
    let fixture = Fixture::start().await;
    fixture.seed_tokens(&expired_tokens("ref1"));

    assert_eq!(fixture.client.logout().unwrap(), Navigation::to("/"));
    assert!(fixture.restarted_client().stored_tokens().is_none());
    assert_eq!(fixture.client.logout().unwrap(), Navigation::to("/"));
}

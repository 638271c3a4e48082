//! Integration tests for the token refresh monitor
//!
//! Runs the monitor on a short real-time period against a `wiremock`
//! authorization server.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use marketdesk_auth::store::{MemoryStore, TOKENS_KEY};
use marketdesk_auth::{
    AuthClient, AuthConfig, AuthTokens, KeyValueStore, MonitorEvent, Navigation,
    TokenRefreshMonitor,
};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PERIOD: Duration = Duration::from_millis(50);
const THRESHOLD: Duration = Duration::from_secs(600);
const EVENT_WAIT: Duration = Duration::from_secs(5);

fn client_for(server: &MockServer, durable: &Arc<MemoryStore>) -> Arc<AuthClient> {
    let mut config = AuthConfig::new(
        "marketdesk-web",
        format!("{}/authorize", server.uri()),
        format!("{}/token", server.uri()),
        "https://app.example.com/callback",
    );
    config.app_base_url = "https://app.example.com/".to_string();

    Arc::new(
        AuthClient::with_reqwest(
            config,
            Arc::clone(durable) as Arc<dyn KeyValueStore>,
            Arc::new(MemoryStore::new()),
        )
        .unwrap(),
    )
}

fn monitor_for(client: &Arc<AuthClient>) -> Arc<TokenRefreshMonitor> {
    Arc::new(TokenRefreshMonitor::with_timings(Arc::clone(client), PERIOD, THRESHOLD))
}

fn seed(durable: &MemoryStore, lifetime: TimeDelta) {
    let tokens = AuthTokens {
        access_token: "tok1".to_string(),
        refresh_token: Some("ref1".to_string()),
        expires_at: Utc::now() + lifetime,
        token_type: "Bearer".to_string(),
    };
    durable.set(TOKENS_KEY, &serde_json::to_string(&tokens).unwrap()).unwrap();
}

/// Validates a background refresh as a token nears expiry.
///
/// # Test Steps
/// 1. Seed a token expiring inside the threshold
/// 2. Start the monitor and wait for the `Refreshed` event
/// 3. Confirm exactly one refresh call and the new token in the store
#[tokio::test]
async fn test_refreshes_token_nearing_expiry() {
    let server = MockServer::start().await;
    let durable = Arc::new(MemoryStore::new());
    seed(&durable, TimeDelta::minutes(2));

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok2", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &durable);
    let monitor = monitor_for(&client);
    let mut events = monitor.subscribe();
    monitor.start();

    let event = tokio::time::timeout(EVENT_WAIT, events.recv()).await.unwrap().unwrap();
    assert!(matches!(event, MonitorEvent::Refreshed { .. }));

    // A few more ticks must not refresh again
    tokio::time::sleep(PERIOD * 4).await;
    assert!(monitor.is_running());
    assert_eq!(client.stored_tokens().unwrap().access_token, "tok2");

    monitor.stop();
    assert!(!monitor.is_running());
}

/// Validates the forced logout when the server rejects the refresh.
///
/// # Test Steps
/// 1. Seed a token expiring inside the threshold
/// 2. Reject the refresh with `401`
/// 3. Confirm the `LoggedOut` event, a cleared store and a stopped monitor
#[tokio::test]
async fn test_rejected_refresh_logs_out() {
    let server = MockServer::start().await;
    let durable = Arc::new(MemoryStore::new());
    seed(&durable, TimeDelta::minutes(2));

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("revoked"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, &durable);
    let monitor = monitor_for(&client);
    let mut events = monitor.subscribe();
    monitor.start();

    let event = tokio::time::timeout(EVENT_WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(
        event,
        MonitorEvent::LoggedOut { navigation: Navigation::to("https://app.example.com/") }
    );
    assert!(!monitor.is_running());
    assert!(durable.is_empty());
    assert!(!client.is_authenticated());
}

/// Validates that a logout from another client ends the monitor.
///
/// # Test Steps
/// 1. Seed a fresh token and start the monitor
/// 2. Log out through a second client sharing the durable store
/// 3. Confirm the `SessionEnded` event and a stopped monitor without any refresh
#[tokio::test]
async fn test_logout_elsewhere_ends_monitor() {
    let server = MockServer::start().await;
    let durable = Arc::new(MemoryStore::new());
    seed(&durable, TimeDelta::hours(1));

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server, &durable);
    let monitor = monitor_for(&client);
    let mut events = monitor.subscribe();
    monitor.start();

    client_for(&server, &durable).logout().unwrap();

    let event = tokio::time::timeout(EVENT_WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event, MonitorEvent::SessionEnded);
    assert!(!monitor.is_running());
}

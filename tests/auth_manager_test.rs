//! Token manager integration tests using wiremock
//!
//! Verifies the refresh lifecycle in `src/auth/manager.rs`:
//!
//! - An expired token is refreshed transparently and the new record is
//!   persisted.
//! - Refresh is single-flight: ten concurrent callers produce exactly one
//!   token endpoint request.
//! - A rejected refresh clears memory and disk and fails closed.
//! - A response that omits `refresh_token` keeps the previous one.
//! - A static token short-circuits everything with zero network calls.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use keywarden::auth::flow::{FlowConfig, UrlOpener};
use keywarden::auth::manager::TokenManager;
use keywarden::auth::token_store::{FileTokenStore, TokenRecord};
use keywarden::auth::Clock;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now_ms(&self) -> u64 {
        self.0
    }
}

struct NoopOpener;

impl UrlOpener for NoopOpener {
    fn open(&self, _url: &str) -> std::io::Result<()> {
        Ok(())
    }
}

fn make_flow_config(server_url: &str) -> FlowConfig {
    FlowConfig {
        authorize_endpoint: format!("{}/oauth/authorize", server_url),
        token_endpoint: format!("{}/oauth/access_token", server_url),
        client_id: Some("test-client-id".to_string()),
        client_secret: Some("test-client-secret".to_string()),
        scope: "read write".to_string(),
        redirect_port: 18640,
        timeout: Duration::from_secs(5),
    }
}

fn make_manager(server_url: &str, store: FileTokenStore, now_ms: u64) -> TokenManager {
    TokenManager::with_parts(
        None,
        make_flow_config(server_url),
        store,
        Arc::new(reqwest::Client::new()),
        Arc::new(FixedClock(now_ms)),
        Arc::new(NoopOpener),
    )
}

fn expired_record() -> TokenRecord {
    TokenRecord {
        access_token: "stale-access-token".to_string(),
        refresh_token: "valid-refresh-token".to_string(),
        // Already past relative to the clocks used below.
        expires_at: 500_000,
        token_type: "Bearer".to_string(),
        scope: "read write".to_string(),
    }
}

fn refreshed_body(refresh_token: Option<&str>) -> serde_json::Value {
    let mut body = serde_json::json!({
        "access_token": "renewed-access-token",
        "expires_in": 3600,
        "token_type": "Bearer",
        "scope": "read write"
    });
    if let Some(rt) = refresh_token {
        body["refresh_token"] = serde_json::json!(rt);
    }
    body
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=valid-refresh-token"))
        .and(body_string_contains("client_id=test-client-id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refreshed_body(Some(
            "rotated-refresh-token",
        ))))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(temp.path().join("tokens.json"));
    store.save(&expired_record()).unwrap();

    let manager = make_manager(&server.uri(), store.clone(), 1_000_000);

    let token = manager.get_access_token().await.unwrap();
    assert_eq!(token, "renewed-access-token");

    // The whole record was replaced and written through to disk.
    let persisted = store.load().expect("refreshed record should be persisted");
    assert_eq!(persisted.access_token, "renewed-access-token");
    assert_eq!(persisted.refresh_token, "rotated-refresh-token");
    assert_eq!(persisted.expires_at, 1_000_000 + 3_600_000);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(refreshed_body(Some("rotated-refresh-token")))
                // Hold the response long enough for every caller to pile up
                // behind the refresh lock.
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(temp.path().join("tokens.json"));
    store.save(&expired_record()).unwrap();

    let manager = Arc::new(make_manager(&server.uri(), store, 1_000_000));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(
            async move { manager.get_access_token().await },
        ));
    }

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token, "renewed-access-token");
    }
    // wiremock verifies expect(1) on drop.
}

#[tokio::test]
async fn test_rejected_refresh_clears_all_state() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(temp.path().join("tokens.json"));
    store.save(&expired_record()).unwrap();

    let manager = make_manager(&server.uri(), store.clone(), 1_000_000);

    let err = manager.get_access_token().await.err().unwrap();
    let msg = err.to_string();
    assert!(msg.contains("refresh failed"), "unexpected error: {msg}");
    assert!(msg.contains("invalid_grant"), "unexpected error: {msg}");

    // Fail closed: nothing usable remains in memory or on disk.
    assert!(!manager.has_valid_token().await);
    assert_eq!(manager.token_info().await, None);
    assert_eq!(store.load(), None);

    // The next caller is told to re-authenticate, not to retry.
    let err = manager.get_access_token().await.err().unwrap();
    assert!(
        err.to_string().contains("Not authenticated"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_refresh_without_rotation_keeps_old_refresh_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(refreshed_body(None)))
        .expect(1)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(temp.path().join("tokens.json"));
    store.save(&expired_record()).unwrap();

    let manager = make_manager(&server.uri(), store.clone(), 1_000_000);

    manager.get_access_token().await.unwrap();

    let persisted = store.load().unwrap();
    assert_eq!(persisted.refresh_token, "valid-refresh-token");
}

#[tokio::test]
async fn test_valid_token_never_touches_the_network() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(temp.path().join("tokens.json"));
    store
        .save(&TokenRecord {
            access_token: "still-good".to_string(),
            refresh_token: "ref".to_string(),
            expires_at: 10_000_000,
            token_type: "Bearer".to_string(),
            scope: "read write".to_string(),
        })
        .unwrap();

    let manager = make_manager(&server.uri(), store, 1_000_000);

    assert_eq!(manager.get_access_token().await.unwrap(), "still-good");
}

#[tokio::test]
async fn test_static_token_short_circuits_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let temp = tempfile::tempdir().unwrap();
    let store = FileTokenStore::new(temp.path().join("tokens.json"));

    let manager = TokenManager::with_parts(
        Some("pre-issued-token".to_string()),
        make_flow_config(&server.uri()),
        store.clone(),
        Arc::new(reqwest::Client::new()),
        Arc::new(FixedClock(u64::MAX - 1)),
        Arc::new(NoopOpener),
    );

    assert_eq!(
        manager.get_access_token().await.unwrap(),
        "pre-issued-token"
    );
    assert!(manager.has_valid_token().await);

    // Static credentials never reach the store.
    assert_eq!(store.load(), None);
}

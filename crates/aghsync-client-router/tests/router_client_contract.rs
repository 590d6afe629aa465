// Integration tests for `RouterClient` using wiremock.
//
// The mock router answers by JSON-RPC method; `.expect(n)` is verified when
// the server drops at the end of each test.

use aghsync_client_router::RouterClient;
use aghsync_client_router::rpc::{Challenge, login_hash};
use aghsync_core::{EndpointConfig, Error, ProtectionClient};
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

const USERNAME: &str = "root";
const PASSWORD: &str = "goodlife";
const SID: &str = "sid-0001";

fn challenge() -> Challenge {
    Challenge {
        alg: json!(1),
        salt: "Zk3pQ9aB".to_string(),
        nonce: "c0ffee".to_string(),
    }
}

fn config_for(server: &MockServer) -> EndpointConfig {
    let addr = server.address();
    EndpointConfig::new(addr.ip().to_string())
        .with_port(addr.port())
        .with_router_mode(true)
        .with_credentials(USERNAME, PASSWORD)
}

fn rpc_ok(result: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 0, "result": result }))
}

fn rpc_err(code: i64, message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 0,
        "error": { "code": code, "message": message }
    }))
}

async fn mount_login(server: &MockServer, times: u64) {
    let c = challenge();
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({
            "method": "challenge",
            "params": { "username": USERNAME }
        })))
        .respond_with(rpc_ok(json!({ "alg": 1, "salt": c.salt, "nonce": c.nonce })))
        .expect(times)
        .mount(server)
        .await;

    let hash = login_hash(USERNAME, PASSWORD, &c).unwrap();
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({
            "method": "login",
            "params": { "username": "root", "hash": hash }
        })))
        .respond_with(rpc_ok(json!({ "sid": SID })))
        .expect(times)
        .mount(server)
        .await;
}

async fn mount_get_config(server: &MockServer, enabled: bool, dns_enabled: bool, times: u64) {
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({
            "method": "call",
            "params": [SID, "adguardhome", "get_config"]
        })))
        .respond_with(rpc_ok(json!({
            "enabled": enabled,
            "dns_enabled": dns_enabled,
            "upstream": "1.1.1.1"
        })))
        .expect(times)
        .mount(server)
        .await;
}

// ── Session tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_session_reused_within_ttl() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_get_config(&server, true, true, 2).await;

    let client = RouterClient::new(&config_for(&server)).unwrap();

    assert!(client.read_status().await.unwrap());
    assert!(client.read_status().await.unwrap());
    assert_eq!(client.session_epoch(), 1);
}

#[tokio::test]
async fn test_session_expiry_forces_fresh_login() {
    let server = MockServer::start().await;
    mount_login(&server, 2).await;
    mount_get_config(&server, true, true, 2).await;

    let client =
        RouterClient::with_session_ttl(&config_for(&server), Duration::from_millis(200)).unwrap();

    assert!(client.read_status().await.unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!client.sessions().is_authenticated().await);

    assert!(client.read_status().await.unwrap());
    assert_eq!(client.session_epoch(), 2);
}

#[tokio::test]
async fn test_concurrent_callers_share_one_login() {
    let server = MockServer::start().await;
    let c = challenge();
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({ "method": "challenge" })))
        .respond_with(
            rpc_ok(json!({ "alg": 1, "salt": c.salt, "nonce": c.nonce }))
                .set_delay(Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({ "method": "login" })))
        .respond_with(rpc_ok(json!({ "sid": SID })))
        .expect(1)
        .mount(&server)
        .await;
    mount_get_config(&server, false, true, 2).await;

    let client = RouterClient::new(&config_for(&server)).unwrap();
    let (a, b) = tokio::join!(client.read_status(), client.read_status());

    assert!(!a.unwrap());
    assert!(!b.unwrap());
    assert_eq!(client.session_epoch(), 1);
}

#[tokio::test]
async fn test_access_denied_clears_session() {
    let server = MockServer::start().await;
    mount_login(&server, 2).await;

    // First data call is rejected, later ones succeed
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({ "method": "call" })))
        .respond_with(rpc_err(-32000, "Access denied"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_get_config(&server, true, true, 1).await;

    let client = RouterClient::new(&config_for(&server)).unwrap();

    let result = client.read_status().await;
    assert!(
        matches!(result, Err(Error::Unauthorized(_))),
        "expected Unauthorized, got: {result:?}"
    );
    assert!(!client.sessions().is_authenticated().await);

    assert!(client.read_status().await.unwrap());
    assert_eq!(client.session_epoch(), 2);
}

#[tokio::test]
async fn test_challenge_failure_leaves_no_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let client = RouterClient::new(&config_for(&server)).unwrap();

    let result = client.read_status().await;
    assert!(matches!(result, Err(Error::Unreachable(_))), "got: {result:?}");
    assert!(!client.sessions().is_authenticated().await);
    assert_eq!(client.session_epoch(), 0);
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let server = MockServer::start().await;
    let c = challenge();
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({ "method": "challenge" })))
        .respond_with(rpc_ok(json!({ "alg": 1, "salt": c.salt, "nonce": c.nonce })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({ "method": "login" })))
        .respond_with(rpc_err(-32000, "Access denied"))
        .mount(&server)
        .await;

    let client = RouterClient::new(&config_for(&server)).unwrap();

    let result = client.read_status().await;
    assert!(matches!(result, Err(Error::Unauthorized(_))), "got: {result:?}");
    assert_eq!(client.session_epoch(), 0);
}

// ── Data call tests ─────────────────────────────────────────────────

#[tokio::test]
async fn test_protection_requires_dns_hook() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    mount_get_config(&server, true, false, 1).await;

    let client = RouterClient::new(&config_for(&server)).unwrap();
    assert!(!client.read_status().await.unwrap());
}

#[tokio::test]
async fn test_unexpected_config_shape_is_protocol_error() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({ "method": "call" })))
        .respond_with(rpc_ok(json!({ "enabled": "yes" })))
        .mount(&server)
        .await;

    let client = RouterClient::new(&config_for(&server)).unwrap();
    let result = client.read_status().await;
    assert!(matches!(result, Err(Error::Protocol(_))), "got: {result:?}");
    // Not an auth failure: the session stays
    assert!(client.sessions().is_authenticated().await);
}

#[tokio::test]
async fn test_write_sends_set_config() {
    let server = MockServer::start().await;
    mount_login(&server, 1).await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(json!({
            "jsonrpc": "2.0",
            "method": "call",
            "params": [SID, "adguardhome", "set_config", { "enabled": true, "dns_enabled": false }],
            "id": 0
        })))
        .respond_with(rpc_ok(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let client = RouterClient::new(&config_for(&server)).unwrap();
    client.write_protection(false).await.unwrap();
}

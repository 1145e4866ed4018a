//! Authentication, rate limiting and the mutation webhook.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{default_gateway, spawn, spawn_default};
use sluice_auth::{RemoteAuth, StaticAuth};
use sluice_core::auth::CallerIdentity;
use sluice_gateway::WebhookNotifier;
use sluice_ratelimit::{FixedWindowLimiter, MemoryCounterStore};

#[tokio::test]
async fn test_fixed_window_denies_third_request() {
    let mut gateway = default_gateway();
    gateway.limiter = FixedWindowLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        2,
        Duration::from_secs(60),
    );
    let gw = spawn(gateway).await;

    let get = || {
        gw.client
            .get(gw.url("/v1/resources/r1/providers/memstore/"))
            .header("Authorization", "Bearer tok-a")
            .send()
    };
    assert_eq!(get().await.unwrap().status(), 200);
    assert_eq!(get().await.unwrap().status(), 200);

    let response = get().await.unwrap();
    assert_eq!(response.status(), 429);
    let retry_after: u64 = response.headers()["Retry-After"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!(retry_after > 0 && retry_after <= 60);
    assert_eq!(response.headers()["X-RateLimit-Limit"], "2");
    assert_eq!(response.headers()["X-RateLimit-Remaining"], "0");
    assert!(response.headers().contains_key("X-RateLimit-Reset"));

    // A different credential still gets through.
    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/"))
        .header("Authorization", "Bearer tok-b")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_cookie_callers_bypass_the_limiter() {
    let mut gateway = default_gateway();
    gateway.limiter = FixedWindowLimiter::new(
        Arc::new(MemoryCounterStore::new()),
        1,
        Duration::from_secs(60),
    );
    let gw = spawn(gateway).await;

    for _ in 0..4 {
        let response = gw
            .client
            .get(gw.url("/v1/resources/r1/providers/memstore/"))
            .header("Cookie", "session=abc")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
}

#[tokio::test]
async fn test_static_auth_rejects_unknown_tokens() {
    let mut gateway = default_gateway();
    gateway.auth = Arc::new(StaticAuth::new().with_token(
        "good-token",
        CallerIdentity { id: "u1".to_string(), name: None, email: None },
    ));
    let gw = spawn(gateway).await;

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/"))
        .header("Authorization", "Bearer good-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_view_only_callers_cannot_mutate() {
    let gw = spawn_default().await;

    let response = gw
        .client
        .put(gw.url(
            "/v1/resources/r1/providers/memstore/?kind=file&name=a.txt&view_only=key",
        ))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Reads stay allowed.
    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/?view_only=key"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_remote_auth_decisions_flow_through() {
    let auth_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/grants"))
        .and(body_partial_json(serde_json::json!({ "auth": { "bearer": "allowed" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "credentials": {},
            "settings": {},
            "identity": { "id": "u1" }
        })))
        .mount(&auth_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/grants"))
        .and(body_partial_json(serde_json::json!({ "auth": { "bearer": "denied" } })))
        .respond_with(
            ResponseTemplate::new(403)
                .set_body_json(serde_json::json!({ "message": "no access to r1" })),
        )
        .mount(&auth_server)
        .await;

    let mut gateway = default_gateway();
    gateway.auth =
        Arc::new(RemoteAuth::new(auth_server.uri(), Duration::from_secs(2)).unwrap());
    let gw = spawn(gateway).await;

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/"))
        .header("Authorization", "Bearer allowed")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/"))
        .header("Authorization", "Bearer denied")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert_eq!(doc["code"], "Forbidden");
}

#[tokio::test]
async fn test_webhook_fires_after_mutation() {
    let hook_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({
            "action": "upload",
            "resource": "r1",
            "provider": "memstore",
            "path": "/a.txt"
        })))
        .respond_with(ResponseTemplate::new(204))
        .mount(&hook_server)
        .await;

    let mut gateway = default_gateway();
    gateway.notifier =
        Arc::new(WebhookNotifier::new(hook_server.uri(), Duration::from_secs(2)).unwrap());
    let gw = spawn(gateway).await;

    let response = gw
        .client
        .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file&name=a.txt"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    // Delivery is fire-and-forget; poll briefly for it to land.
    for _ in 0..50 {
        if !hook_server.received_requests().await.unwrap().is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("webhook was never delivered");
}

#[tokio::test]
async fn test_failing_webhook_does_not_affect_the_response() {
    let hook_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&hook_server)
        .await;

    let mut gateway = default_gateway();
    gateway.notifier =
        Arc::new(WebhookNotifier::new(hook_server.uri(), Duration::from_secs(1)).unwrap());
    let gw = spawn(gateway).await;

    let response = gw
        .client
        .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file&name=a.txt"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

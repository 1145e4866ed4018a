//! File lifecycle over HTTP: upload, download, metadata, revisions,
//! ranges and signed-URL redirects.

use std::sync::Arc;

use crate::common::{gateway_with, spawn, spawn_default};
use sluice_core::config::Config;
use sluice_providers::{MemStoreFactory, ProviderRegistry};

const HELLO_SHA256: &str =
    "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

#[tokio::test]
async fn test_upload_then_download() {
    let gw = spawn_default().await;

    let response = gw
        .client
        .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file&name=a.txt"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert_eq!(doc["data"]["type"], "files");
    assert_eq!(doc["data"]["attributes"]["size"], 5);
    assert_eq!(doc["data"]["attributes"]["hashes"]["sha256"], HELLO_SHA256);
    assert_eq!(doc["data"]["attributes"]["path"], "/a.txt");

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["Content-Disposition"],
        "attachment; filename=\"a.txt\""
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn test_metadata_and_revisions() {
    let gw = spawn_default().await;
    let put = |body: &'static str| {
        gw.client
            .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file&name=a.txt&conflict=replace"))
            .body(body)
            .send()
    };
    assert_eq!(put("one").await.unwrap().status(), 201);
    assert_eq!(put("two!").await.unwrap().status(), 200);

    let doc: serde_json::Value = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt?meta="))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(doc["data"]["attributes"]["size"], 4);

    let doc: serde_json::Value = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt?revisions="))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let revisions = doc["data"].as_array().unwrap();
    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0]["id"], "2");
    assert_eq!(revisions[0]["type"], "file_versions");

    // meta wins when both flags are present.
    let doc: serde_json::Value = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt?meta=&revisions="))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(doc["data"].is_object());

    // A pinned version still serves the old bytes.
    let body = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt?version=1"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"one");
}

#[tokio::test]
async fn test_identical_uploads_keep_hash_stable() {
    let gw = spawn_default().await;
    let put = || {
        gw.client
            .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file&name=a.txt&conflict=replace"))
            .body("same bytes")
            .send()
    };
    let first: serde_json::Value = put().await.unwrap().json().await.unwrap();
    let second: serde_json::Value = put().await.unwrap().json().await.unwrap();
    assert_eq!(
        first["data"]["attributes"]["hashes"]["sha256"],
        second["data"]["attributes"]["hashes"]["sha256"]
    );
}

#[tokio::test]
async fn test_display_name_overrides_disposition() {
    let gw = spawn_default().await;
    gw.client
        .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file&name=a.txt"))
        .body("x")
        .send()
        .await
        .unwrap();

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt?displayName=pretty.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()["Content-Disposition"],
        "attachment; filename=\"pretty.txt\""
    );
}

#[tokio::test]
async fn test_range_download_is_partial_content() {
    let gw = spawn_default().await;
    gw.client
        .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file&name=a.txt"))
        .body("hello world")
        .send()
        .await
        .unwrap();

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt"))
        .header("Range", "bytes=6-10")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 206);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"world");
}

#[tokio::test]
async fn test_trailing_slash_mismatch_is_not_found() {
    let gw = spawn_default().await;
    gw.client
        .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file&name=a.txt"))
        .body("x")
        .send()
        .await
        .unwrap();

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert_eq!(doc["code"], "NotFound");
}

#[tokio::test]
async fn test_signed_url_redirect_and_direct_proxy() {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(
        MemStoreFactory::new("memstore").with_signed_base("https://cdn.example.com"),
    ));
    let gw = spawn(gateway_with(registry, Config::default())).await;

    gw.client
        .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file&name=a.txt"))
        .body("hello")
        .send()
        .await
        .unwrap();

    // Without `direct` the provider's signed URL wins.
    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 302);
    assert_eq!(
        response.headers()["Location"],
        "https://cdn.example.com/r1/a.txt"
    );

    // With `direct` the gateway proxies bytes itself.
    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt?direct="))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"hello");
}

#[tokio::test]
async fn test_unknown_provider_is_not_found() {
    let gw = spawn_default().await;
    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/nothere/a.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_status_and_metrics_endpoints() {
    let gw = spawn_default().await;

    let doc: serde_json::Value = gw
        .client
        .get(gw.url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(doc["status"], "up");

    gw.client
        .get(gw.url("/v1/resources/r1/providers/memstore/"))
        .send()
        .await
        .unwrap();
    let text = gw
        .client
        .get(gw.url("/metrics"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(text.contains("sluice_requests_total"));
}

#[tokio::test]
async fn test_responses_carry_request_ids() {
    let gw = spawn_default().await;
    let response = gw.client.get(gw.url("/status")).send().await.unwrap();
    assert!(response.headers().contains_key("X-Request-Id"));
}

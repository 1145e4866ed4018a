//! Rename, move and copy over HTTP, including cross-provider streaming.

use std::sync::Arc;

use crate::common::{gateway_with, spawn, spawn_default, TestGateway};
use sluice_core::config::Config;
use sluice_providers::{MemStoreFactory, ProviderRegistry};

/// Gateway with two distinct in-memory providers mounted, so transfers
/// between them must stream through the engine.
async fn two_provider_gateway() -> TestGateway {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(MemStoreFactory::new("memstore")));
    registry.register(Arc::new(MemStoreFactory::new("boxstore")));
    spawn(gateway_with(registry, Config::default())).await
}

async fn upload(gw: &TestGateway, provider: &str, parent: &str, name: &str, body: &'static str) {
    let status = gw
        .client
        .put(gw.url(&format!(
            "/v1/resources/r1/providers/{provider}{parent}?kind=file&name={name}"
        )))
        .body(body)
        .send()
        .await
        .unwrap()
        .status();
    assert!(status.is_success(), "seeding {name} failed: {status}");
}

#[tokio::test]
async fn test_rename() {
    let gw = spawn_default().await;
    upload(&gw, "memstore", "/", "a.txt", "content").await;

    let response = gw
        .client
        .post(gw.url("/v1/resources/r1/providers/memstore/a.txt"))
        .json(&serde_json::json!({ "action": "rename", "rename": "b.txt" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert_eq!(doc["data"]["attributes"]["name"], "b.txt");

    let body = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/b.txt"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"content");
    assert_eq!(
        gw.client
            .get(gw.url("/v1/resources/r1/providers/memstore/a.txt"))
            .send()
            .await
            .unwrap()
            .status(),
        404
    );
}

#[tokio::test]
async fn test_cross_provider_copy_preserves_hashes() {
    let gw = two_provider_gateway().await;
    upload(&gw, "memstore", "/", "src.txt", "stream me across").await;

    let source_doc: serde_json::Value = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/src.txt?meta="))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let response = gw
        .client
        .post(gw.url("/v1/resources/r1/providers/memstore/src.txt"))
        .json(&serde_json::json!({
            "action": "copy",
            "path": "/",
            "resource": "r2",
            "provider": "boxstore"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert_eq!(doc["data"]["attributes"]["provider"], "boxstore");
    assert_eq!(
        doc["data"]["attributes"]["hashes"]["sha256"],
        source_doc["data"]["attributes"]["hashes"]["sha256"]
    );

    let body = gw
        .client
        .get(gw.url("/v1/resources/r2/providers/boxstore/src.txt"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"stream me across");
}

#[tokio::test]
async fn test_move_removes_source() {
    let gw = two_provider_gateway().await;
    upload(&gw, "memstore", "/", "src.txt", "moving day").await;

    let response = gw
        .client
        .post(gw.url("/v1/resources/r1/providers/memstore/src.txt"))
        .json(&serde_json::json!({
            "action": "move",
            "path": "/",
            "provider": "boxstore"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    assert_eq!(
        gw.client
            .get(gw.url("/v1/resources/r1/providers/memstore/src.txt"))
            .send()
            .await
            .unwrap()
            .status(),
        404
    );
    let body = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/boxstore/src.txt"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"moving day");
}

#[tokio::test]
async fn test_conflict_warn_is_409_with_conflicting_name() {
    let gw = two_provider_gateway().await;
    upload(&gw, "memstore", "/", "report.txt", "new").await;
    upload(&gw, "boxstore", "/", "report.txt", "old").await;

    let response = gw
        .client
        .post(gw.url("/v1/resources/r1/providers/memstore/report.txt"))
        .json(&serde_json::json!({
            "action": "copy",
            "path": "/",
            "provider": "boxstore"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert_eq!(doc["code"], "NamingConflict");
    assert_eq!(doc["data"]["conflicting_name"], "report.txt");
}

#[tokio::test]
async fn test_conflict_keep_numbers_the_copy() {
    let gw = two_provider_gateway().await;
    upload(&gw, "memstore", "/", "report.txt", "third").await;
    upload(&gw, "boxstore", "/", "report.txt", "first").await;
    upload(&gw, "boxstore", "/", "report (1).txt", "second").await;

    let response = gw
        .client
        .post(gw.url("/v1/resources/r1/providers/memstore/report.txt"))
        .json(&serde_json::json!({
            "action": "copy",
            "path": "/",
            "provider": "boxstore",
            "conflict": "keep"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert_eq!(doc["data"]["attributes"]["name"], "report (2).txt");

    let body = gw
        .client
        .get(gw.url(
            "/v1/resources/r1/providers/boxstore/report%20%282%29.txt",
        ))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"third");
}

#[tokio::test]
async fn test_conflict_replace_overwrites_with_200() {
    let gw = two_provider_gateway().await;
    upload(&gw, "memstore", "/", "report.txt", "new").await;
    upload(&gw, "boxstore", "/", "report.txt", "old").await;

    let response = gw
        .client
        .post(gw.url("/v1/resources/r1/providers/memstore/report.txt"))
        .json(&serde_json::json!({
            "action": "copy",
            "path": "/",
            "provider": "boxstore",
            "conflict": "replace"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let body = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/boxstore/report.txt"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(body.as_ref(), b"new");
}

#[tokio::test]
async fn test_folder_copy_includes_children_in_response() {
    let gw = two_provider_gateway().await;
    let status = gw
        .client
        .put(gw.url("/v1/resources/r1/providers/memstore/?kind=folder&name=docs"))
        .send()
        .await
        .unwrap()
        .status();
    assert_eq!(status, 201);
    upload(&gw, "memstore", "/docs/", "a.txt", "x").await;

    let response = gw
        .client
        .post(gw.url("/v1/resources/r1/providers/memstore/docs/"))
        .json(&serde_json::json!({
            "action": "copy",
            "path": "/",
            "provider": "boxstore"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let doc: serde_json::Value = response.json().await.unwrap();
    assert_eq!(doc["data"]["type"], "folders");
    let children = doc["data"]["attributes"]["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["name"], "a.txt");
}

#[tokio::test]
async fn test_move_destination_must_be_a_folder_path() {
    let gw = spawn_default().await;
    upload(&gw, "memstore", "/", "a.txt", "x").await;

    let response = gw
        .client
        .post(gw.url("/v1/resources/r1/providers/memstore/a.txt"))
        .json(&serde_json::json!({ "action": "move", "path": "/b.txt" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_unknown_action_is_invalid() {
    let gw = spawn_default().await;
    upload(&gw, "memstore", "/", "a.txt", "x").await;

    let response = gw
        .client
        .post(gw.url("/v1/resources/r1/providers/memstore/a.txt"))
        .json(&serde_json::json!({ "action": "teleport" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

//! Folder lifecycle: creation, listing, ZIP archives and root deletion.

use crate::common::{spawn_default, unzip};

async fn create_folder(gw: &crate::common::TestGateway, parent: &str, name: &str) -> u16 {
    gw.client
        .put(gw.url(&format!(
            "/v1/resources/r1/providers/memstore{parent}?kind=folder&name={name}"
        )))
        .send()
        .await
        .unwrap()
        .status()
        .as_u16()
}

async fn upload(gw: &crate::common::TestGateway, parent: &str, name: &str, body: &'static str) {
    let status = gw
        .client
        .put(gw.url(&format!(
            "/v1/resources/r1/providers/memstore{parent}?kind=file&name={name}"
        )))
        .body(body)
        .send()
        .await
        .unwrap()
        .status();
    assert!(status.is_success(), "upload of {name} failed: {status}");
}

#[tokio::test]
async fn test_create_folder_and_conflict() {
    let gw = spawn_default().await;
    assert_eq!(create_folder(&gw, "/", "docs").await, 201);
    assert_eq!(create_folder(&gw, "/", "docs").await, 409);
}

#[tokio::test]
async fn test_folder_listing() {
    let gw = spawn_default().await;
    assert_eq!(create_folder(&gw, "/", "docs").await, 201);
    upload(&gw, "/docs/", "a.txt", "x").await;

    let doc: serde_json::Value = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/docs/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = doc["data"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["type"], "files");
    assert_eq!(entries[0]["attributes"]["name"], "a.txt");
    assert_eq!(entries[0]["attributes"]["path"], "/docs/a.txt");
}

#[tokio::test]
async fn test_folder_get_without_slash_is_not_found() {
    let gw = spawn_default().await;
    assert_eq!(create_folder(&gw, "/", "docs").await, 201);
    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/docs"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_zip_of_nested_folder() {
    let gw = spawn_default().await;
    assert_eq!(create_folder(&gw, "/", "docs").await, 201);
    assert_eq!(create_folder(&gw, "/docs/", "sub").await, 201);
    upload(&gw, "/docs/", "a.txt", "x").await;
    upload(&gw, "/docs/sub/", "b.txt", "y").await;

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/docs/?zip="))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["Content-Type"], "application/zip");
    assert_eq!(
        response.headers()["Content-Disposition"],
        "attachment; filename=\"docs.zip\""
    );

    let bytes = response.bytes().await.unwrap();
    let entries = unzip(&bytes);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].0, "a.txt");
    assert_eq!(entries[0].1, b"x");
    assert_eq!(entries[1].0, "sub/b.txt");
    assert_eq!(entries[1].1, b"y");
}

#[tokio::test]
async fn test_root_delete_requires_confirmation() {
    let gw = spawn_default().await;
    upload(&gw, "/", "a.txt", "x").await;

    let response = gw
        .client
        .delete(gw.url("/v1/resources/r1/providers/memstore/"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = gw
        .client
        .delete(gw.url("/v1/resources/r1/providers/memstore/?confirm_delete=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // Root survives its own deletion, empty.
    let doc: serde_json::Value = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(doc["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_file() {
    let gw = spawn_default().await;
    upload(&gw, "/", "a.txt", "x").await;

    let response = gw
        .client
        .delete(gw.url("/v1/resources/r1/providers/memstore/a.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    let response = gw
        .client
        .get(gw.url("/v1/resources/r1/providers/memstore/a.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_upload_without_name_is_invalid() {
    let gw = spawn_default().await;
    let response = gw
        .client
        .put(gw.url("/v1/resources/r1/providers/memstore/?kind=file"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_resources_are_isolated() {
    let gw = spawn_default().await;
    upload(&gw, "/", "a.txt", "x").await;

    let response = gw
        .client
        .get(gw.url("/v1/resources/other/providers/memstore/a.txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

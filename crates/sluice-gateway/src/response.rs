//! Response shaping
//!
//! JSON-API-style envelopes for entities and listings, error bodies, and
//! the body plumbing that turns a core [`ByteStream`] into a hyper
//! response body without buffering.

use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::{Response, StatusCode};
use serde_json::{json, Value};

use sluice_core::errors::GatewayError;
use sluice_core::metadata::{Metadata, RevisionMetadata};
use sluice_core::streams::BoxStream;

/// Body type every handler produces. Unsync because provider streams hold
/// boxed futures internally.
pub type GatewayBody = UnsyncBoxBody<Bytes, std::io::Error>;

pub fn empty_body() -> GatewayBody {
    Full::new(Bytes::new())
        .map_err(|never| match never {})
        .boxed_unsync()
}

pub fn full_body(bytes: impl Into<Bytes>) -> GatewayBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// Adapts a pull-based stream into a hyper body, chunk for chunk.
pub fn stream_body(stream: BoxStream) -> GatewayBody {
    let frames = futures_util::stream::unfold(Some(stream), |state| async move {
        let mut stream = state?;
        match stream.next_chunk().await {
            Ok(Some(chunk)) => Some((Ok(Frame::data(chunk)), Some(stream))),
            Ok(None) => None,
            Err(err) => Some((Err(std::io::Error::other(err.to_string())), None)),
        }
    });
    StreamBody::new(frames).boxed_unsync()
}

pub fn json_response(status: StatusCode, value: &Value) -> Response<GatewayBody> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json; charset=utf-8")
        .body(full_body(value.to_string()))
        .unwrap()
}

/// The `{code, message, data?}` error body.
pub fn error_response(err: &GatewayError) -> Response<GatewayBody> {
    let mut body = json!({
        "code": err.code(),
        "message": err.to_string(),
    });
    if let Some(data) = err.data() {
        body["data"] = data;
    }
    let mut response = json_response(
        StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        &body,
    );
    if let GatewayError::RateLimited { retry_after } = err {
        let headers = response.headers_mut();
        headers.insert("Retry-After", retry_after.to_string().parse().unwrap());
    }
    response
}

fn entity_url(resource: &str, provider: &str, meta: &Metadata) -> String {
    format!("/v1/resources/{resource}/providers/{provider}{}", meta.path())
}

/// Action links for an entity, per its kind.
fn entity_links(resource: &str, provider: &str, meta: &Metadata) -> Value {
    let url = entity_url(resource, provider, meta);
    match meta {
        Metadata::File(_) => json!({
            "self": url,
            "download": url,
            "upload": format!("{url}?kind=file"),
            "move": url,
            "delete": url,
        }),
        Metadata::Folder(_) => json!({
            "self": url,
            "new_folder": format!("{url}?kind=folder"),
            "upload": format!("{url}?kind=file"),
            "move": url,
            "delete": url,
        }),
    }
}

fn entity_object(resource: &str, provider: &str, meta: &Metadata) -> Value {
    json!({
        "id": format!("{provider}{}", meta.path()),
        "type": meta.kind(),
        "attributes": meta.attributes(),
        "links": entity_links(resource, provider, meta),
    })
}

/// Single-entity document, optionally with folder children and transfer
/// warnings folded into the attributes.
pub fn entity_document(
    resource: &str,
    provider: &str,
    meta: &Metadata,
    children: Option<&[Metadata]>,
    warnings: &[String],
) -> Value {
    let mut data = entity_object(resource, provider, meta);
    if let Some(children) = children {
        data["attributes"]["children"] = children
            .iter()
            .map(|child| child.attributes())
            .collect::<Vec<_>>()
            .into();
    }
    if !warnings.is_empty() {
        data["attributes"]["warnings"] = warnings.into();
    }
    json!({ "data": data })
}

/// Folder-listing document: an array of entity objects.
pub fn listing_document(resource: &str, provider: &str, children: &[Metadata]) -> Value {
    json!({
        "data": children
            .iter()
            .map(|child| entity_object(resource, provider, child))
            .collect::<Vec<_>>()
    })
}

/// Revision-listing document, newest first as produced by the provider.
pub fn revisions_document(revisions: &[RevisionMetadata]) -> Value {
    json!({
        "data": revisions
            .iter()
            .map(|revision| {
                json!({
                    "id": revision.version,
                    "type": "file_versions",
                    "attributes": revision.attributes(),
                })
            })
            .collect::<Vec<_>>()
    })
}

/// `attachment` disposition with a quoted, escaped filename.
pub fn attachment_disposition(filename: &str) -> String {
    let escaped = filename.replace('\\', "\\\\").replace('"', "\\\"");
    format!("attachment; filename=\"{escaped}\"")
}

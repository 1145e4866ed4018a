//! The v1 request pipeline
//!
//! One request flows: URL + query parsing → rate limiter → auth grant →
//! provider materialisation → path validation → action → response shaping,
//! with the mutation hook fired after success. Streaming bodies are
//! proxied chunk for chunk in both directions; nothing here buffers a
//! file.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use sluice_auth::{RemoteAuth, StaticAuth};
use sluice_core::auth::{Action, AuthHandler, AuthTokens, CallerIdentity};
use sluice_core::config::Config;
use sluice_core::errors::{GatewayError, GatewayResult};
use sluice_core::metadata::Metadata;
use sluice_core::metrics::MetricsSink;
use sluice_core::notify::{ChangeEvent, ChangeNotifier, MutationKind, NoopNotifier};
use sluice_core::provider::{ByteRange, Download, StorageProvider};
use sluice_core::streams::ByteStream;
use sluice_engine::{naming, zip_folder, ConflictPolicy, TransferOptions, TransferRequest};
use sluice_providers::{LocalFsFactory, MemStoreFactory, ProviderRegistry};
use sluice_ratelimit::{FixedWindowLimiter, LimitDecision, MemoryCounterStore, SqliteCounterStore};

use crate::metrics::GatewayMetrics;
use crate::query::ApiQuery;
use crate::response::{
    attachment_disposition, empty_body, entity_document, error_response, json_response,
    listing_document, revisions_document, stream_body, GatewayBody,
};
use crate::webhook::WebhookNotifier;

/// Upper bound on move/copy/rename JSON bodies.
const ACTION_BODY_LIMIT: usize = 1024 * 1024;

/// Everything a request needs, assembled once at startup.
pub struct Gateway {
    pub config: Config,
    pub registry: ProviderRegistry,
    pub auth: Arc<dyn AuthHandler>,
    pub limiter: FixedWindowLimiter,
    pub notifier: Arc<dyn ChangeNotifier>,
    pub metrics: Arc<GatewayMetrics>,
}

impl Gateway {
    /// Wires a gateway from configuration: registers the bundled
    /// providers, selects the auth handler and the limiter store.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MemStoreFactory::new("memstore")));
        if let Some(root) = &config.providers.localfs_root {
            registry.register(Arc::new(LocalFsFactory::new(root.clone())));
        }

        let auth: Arc<dyn AuthHandler> = match config.auth.mode.as_str() {
            "remote" => {
                let url = config
                    .auth
                    .url
                    .clone()
                    .ok_or_else(|| anyhow::anyhow!("auth.url is required in remote mode"))?;
                Arc::new(RemoteAuth::new(
                    url,
                    Duration::from_secs(config.auth.timeout_secs),
                )?)
            }
            "static" => Arc::new(StaticAuth::allow_all()),
            other => anyhow::bail!("unknown auth mode: {other}"),
        };

        let limiter = if config.rate_limiting.enabled {
            let window = Duration::from_secs(config.rate_limiting.window_secs);
            match config.rate_limiting.store.as_str() {
                "sqlite" => {
                    let path = config.rate_limiting.sqlite_path.clone().ok_or_else(|| {
                        anyhow::anyhow!("rate_limiting.sqlite_path is required for sqlite store")
                    })?;
                    let store = SqliteCounterStore::connect(&path).await?;
                    FixedWindowLimiter::new(Arc::new(store), config.rate_limiting.limit, window)
                }
                "memory" => FixedWindowLimiter::new(
                    Arc::new(MemoryCounterStore::new()),
                    config.rate_limiting.limit,
                    window,
                ),
                other => anyhow::bail!("unknown rate-limit store: {other}"),
            }
        } else {
            FixedWindowLimiter::disabled()
        };

        let notifier: Arc<dyn ChangeNotifier> = match &config.notifications.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_secs(config.notifications.timeout_secs),
            )?),
            None => Arc::new(NoopNotifier),
        };

        Ok(Self {
            config,
            registry,
            auth,
            limiter,
            notifier,
            metrics: Arc::new(GatewayMetrics::new()?),
        })
    }

    fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            inactivity_timeout: Duration::from_secs(self.config.transfer.inactivity_timeout_secs),
            keep_suffix_cap: self.config.transfer.keep_suffix_cap,
        }
    }
}

/// A parsed `/v1/resources/{resource}/providers/{provider}/{path}` target.
#[derive(Debug)]
struct Target {
    resource: String,
    provider: String,
    /// Decoded raw path, leading slash included, trailing slash preserved.
    raw_path: String,
}

/// Top-level entry: routes, observes, and never panics a connection.
pub async fn handle_request(
    state: Arc<Gateway>,
    req: Request<Incoming>,
    client_ip: Option<String>,
) -> Response<GatewayBody> {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        %request_id,
        method = %req.method(),
        path = %req.uri().path()
    );
    let mut response = route(state, req, client_ip).instrument(span).await;
    response.headers_mut().insert(
        "X-Request-Id",
        HeaderValue::from_str(&request_id.to_string()).unwrap(),
    );
    response
}

async fn route(
    state: Arc<Gateway>,
    req: Request<Incoming>,
    client_ip: Option<String>,
) -> Response<GatewayBody> {
    let path = req.uri().path().to_string();

    if req.method() == Method::GET && path == "/status" {
        return json_response(
            StatusCode::OK,
            &serde_json::json!({ "status": "up", "version": env!("CARGO_PKG_VERSION") }),
        );
    }
    if req.method() == Method::GET && path == "/metrics" {
        return match state.metrics.encode() {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(crate::response::full_body(body))
                .unwrap(),
            Err(err) => error_response(&GatewayError::Unexpected(err.to_string())),
        };
    }

    let Some(rest) = path.strip_prefix("/v1/resources/") else {
        return error_response(&GatewayError::NotFound(path));
    };
    let target = match parse_target(rest) {
        Ok(target) => target,
        Err(err) => return error_response(&err),
    };

    let query = ApiQuery::parse(req.uri().query());
    let tokens = extract_tokens(req.headers(), &query, client_ip);

    // Rate limiting happens before any backend work.
    match state.limiter.check(&tokens).await {
        Ok(Some(decision)) if !decision.allowed => {
            state.metrics.record_rate_limited();
            return rate_limited_response(&decision);
        }
        Ok(_) => {}
        Err(err) => return error_response(&err),
    }

    let action = infer_action(req.method());
    let result = dispatch(&state, req, &target, &query, &tokens).await;
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            if err.status() >= 500 {
                warn!(code = err.code(), error = %err, "request failed");
            } else {
                info!(code = err.code(), error = %err, "request rejected");
            }
            state.metrics.record_error(err.code());
            error_response(&err)
        }
    };
    state.metrics.record_request(
        &target.provider,
        action.as_str(),
        response.status().as_u16(),
    );
    response
}

fn parse_target(rest: &str) -> GatewayResult<Target> {
    let (resource, tail) = rest
        .split_once('/')
        .ok_or_else(|| GatewayError::InvalidPath("missing provider segment".to_string()))?;
    let tail = tail
        .strip_prefix("providers/")
        .ok_or_else(|| GatewayError::NotFound(format!("/v1/resources/{rest}")))?;
    let (provider, raw_path) = match tail.find('/') {
        Some(at) => (&tail[..at], &tail[at..]),
        None => (tail, ""),
    };
    if resource.is_empty() || provider.is_empty() {
        return Err(GatewayError::InvalidPath(
            "resource and provider must be non-empty".to_string(),
        ));
    }
    if raw_path.is_empty() {
        return Err(GatewayError::InvalidPath(
            "the provider root is addressed with a trailing slash".to_string(),
        ));
    }
    Ok(Target {
        resource: decode_segment(resource)?,
        provider: decode_segment(provider)?,
        raw_path: decode_path(raw_path)?,
    })
}

fn decode_segment(raw: &str) -> GatewayResult<String> {
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| GatewayError::InvalidPath(format!("invalid percent-encoding: {raw}")))?;
    Ok(decoded.into_owned())
}

/// Decodes a raw URL path segment-wise so an escaped separator (%2F)
/// cannot change the path's structure.
fn decode_path(raw: &str) -> GatewayResult<String> {
    let mut decoded_parts = Vec::new();
    for segment in raw.split('/') {
        let decoded = decode_segment(segment)?;
        if decoded.contains('/') {
            return Err(GatewayError::InvalidPath(format!(
                "path segment contains separator: {segment}"
            )));
        }
        decoded_parts.push(decoded);
    }
    Ok(decoded_parts.join("/"))
}

fn extract_tokens(headers: &HeaderMap, query: &ApiQuery, client_ip: Option<String>) -> AuthTokens {
    let mut tokens = AuthTokens { client_ip, ..Default::default() };
    if let Some(value) = headers.get("Authorization").and_then(|v| v.to_str().ok()) {
        if let Some(bearer) = value.strip_prefix("Bearer ") {
            tokens.bearer = Some(bearer.trim().to_string());
        } else if let Some(basic) = value.strip_prefix("Basic ") {
            tokens.basic = Some(basic.trim().to_string());
        }
    }
    tokens.cookie = headers
        .get("Cookie")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or_else(|| query.cookie.clone());
    tokens.view_only = query.view_only.clone();
    tokens
}

fn infer_action(method: &Method) -> Action {
    match *method {
        Method::PUT => Action::Write,
        Method::DELETE => Action::Delete,
        Method::POST => Action::CopyFrom,
        _ => Action::Read,
    }
}

fn rate_limited_response(decision: &LimitDecision) -> Response<GatewayBody> {
    let mut response = error_response(&GatewayError::RateLimited {
        retry_after: decision.retry_after,
    });
    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from_str(&decision.limit.to_string()).unwrap(),
    );
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    headers.insert(
        "X-RateLimit-Reset",
        HeaderValue::from_str(&decision.reset_at.to_string()).unwrap(),
    );
    response
}

async fn dispatch(
    state: &Arc<Gateway>,
    req: Request<Incoming>,
    target: &Target,
    query: &ApiQuery,
    tokens: &AuthTokens,
) -> GatewayResult<Response<GatewayBody>> {
    let method = req.method().clone();
    match method {
        Method::GET => handle_get(state, req, target, query, tokens).await,
        Method::PUT => handle_put(state, req, target, query, tokens).await,
        Method::POST => handle_post(state, req, target, query, tokens).await,
        Method::DELETE => handle_delete(state, target, query, tokens).await,
        other => Err(GatewayError::NotSupported(format!(
            "method {other} is not part of the v1 surface"
        ))),
    }
}

/// Auth grant + provider instance for one side of a request.
async fn materialize(
    state: &Gateway,
    resource: &str,
    provider_name: &str,
    action: Action,
    tokens: &AuthTokens,
) -> GatewayResult<(Box<dyn StorageProvider>, CallerIdentity)> {
    let grant = state
        .auth
        .fetch(resource, provider_name, action, tokens)
        .await?;
    let provider = state.registry.make(
        provider_name,
        resource,
        &grant.credentials,
        &grant.settings,
    )?;
    Ok((provider, grant.identity))
}

// ============================================================================
// GET: listing, metadata, revisions, download, zip
// ============================================================================

async fn handle_get(
    state: &Arc<Gateway>,
    req: Request<Incoming>,
    target: &Target,
    query: &ApiQuery,
    tokens: &AuthTokens,
) -> GatewayResult<Response<GatewayBody>> {
    let (provider, _) = materialize(state, &target.resource, &target.provider, Action::Read, tokens).await?;
    let path = provider.validate_v1_path(&target.raw_path).await?;

    if path.is_folder() {
        if query.zip {
            let filename = if path.is_root() {
                format!("{}.zip", target.resource)
            } else {
                format!("{}.zip", path.name())
            };
            let stream = zip_folder(provider, &path).await?;
            return Ok(Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "application/zip")
                .header("Content-Disposition", attachment_disposition(&filename))
                .body(stream_body(Box::new(stream)))
                .unwrap());
        }
        let children = provider.children(&path).await?;
        let doc = listing_document(&target.resource, &target.provider, &children);
        return Ok(json_response(StatusCode::OK, &doc));
    }

    if query.meta {
        let meta = provider.metadata(&path, query.version.as_deref()).await?;
        let doc = entity_document(&target.resource, &target.provider, &meta, None, &[]);
        return Ok(json_response(StatusCode::OK, &doc));
    }
    if query.revisions {
        let revisions = provider.revisions(&path).await?;
        return Ok(json_response(StatusCode::OK, &revisions_document(&revisions)));
    }

    let range = parse_range_header(req.headers())?;
    match provider
        .download(&path, query.version.as_deref(), range, query.direct)
        .await?
    {
        Download::Redirect(url) => Ok(Response::builder()
            .status(StatusCode::FOUND)
            .header("Location", url)
            .body(empty_body())
            .unwrap()),
        Download::Stream(stream) => {
            let filename = query
                .display_name
                .clone()
                .unwrap_or_else(|| path.name().to_string());
            let size = stream.size();
            if let Some(size) = size {
                state.metrics.record_bytes("out", size);
            }

            let status = if range.is_some() {
                StatusCode::PARTIAL_CONTENT
            } else {
                StatusCode::OK
            };
            let mut builder = Response::builder()
                .status(status)
                .header("Content-Type", "application/octet-stream")
                .header("Content-Disposition", attachment_disposition(&filename));
            if let Some(size) = size {
                builder = builder.header("Content-Length", size.to_string());
                if let Some(ByteRange { start, .. }) = range {
                    builder = builder.header(
                        "Content-Range",
                        format!("bytes {start}-{}/*", start + size.saturating_sub(1)),
                    );
                }
            }
            Ok(builder.body(stream_body(stream)).unwrap())
        }
    }
}

/// `Range: bytes=a-b` (single range only).
fn parse_range_header(headers: &HeaderMap) -> GatewayResult<Option<ByteRange>> {
    let Some(value) = headers.get("Range").and_then(|v| v.to_str().ok()) else {
        return Ok(None);
    };
    let spec = value
        .strip_prefix("bytes=")
        .ok_or_else(|| GatewayError::InvalidArgument(format!("unsupported range: {value}")))?;
    let (start, end) = spec
        .split_once('-')
        .ok_or_else(|| GatewayError::InvalidArgument(format!("malformed range: {value}")))?;
    let start: u64 = start
        .parse()
        .map_err(|_| GatewayError::InvalidArgument(format!("malformed range: {value}")))?;
    let end = if end.is_empty() {
        None
    } else {
        Some(end.parse().map_err(|_| {
            GatewayError::InvalidArgument(format!("malformed range: {value}"))
        })?)
    };
    Ok(Some(ByteRange { start, end }))
}

// ============================================================================
// PUT: upload, update, create folder
// ============================================================================

async fn handle_put(
    state: &Arc<Gateway>,
    req: Request<Incoming>,
    target: &Target,
    query: &ApiQuery,
    tokens: &AuthTokens,
) -> GatewayResult<Response<GatewayBody>> {
    let (provider, identity) =
        materialize(state, &target.resource, &target.provider, Action::Write, tokens).await?;
    let options = state.transfer_options();

    let content_length = req
        .headers()
        .get("Content-Length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    let (_, body) = req.into_parts();

    if target.raw_path.ends_with('/') {
        // Create a child of an existing folder.
        let parent = provider.validate_v1_path(&target.raw_path).await?;
        let name = query
            .name
            .clone()
            .ok_or_else(|| GatewayError::InvalidArgument("name parameter required".to_string()))?;
        let policy = conflict_policy(query.conflict.as_deref())?;
        let make_folder = query.kind.as_deref() == Some("folder");

        let resolved = naming::resolve_destination(
            provider.as_ref(),
            &parent,
            &name,
            make_folder,
            policy,
            options.keep_suffix_cap,
        )
        .await?;

        if make_folder {
            if resolved.existing.is_some() {
                provider.delete(&resolved.path, false).await?;
            }
            let meta = Metadata::Folder(provider.create_folder(&resolved.path).await?);
            fire_notification(state, MutationKind::CreateFolder, target, &meta, &identity);
            let doc = entity_document(&target.resource, &target.provider, &meta, None, &[]);
            return Ok(json_response(StatusCode::CREATED, &doc));
        }

        if let Some(existing) = &resolved.existing {
            if !existing.is_file() {
                provider.delete(&resolved.path, false).await?;
            }
        }
        let stream = Box::new(IncomingBody { body, size: content_length });
        let (meta, created) = provider.upload(stream, &resolved.path).await?;
        if let Some(size) = meta.size {
            state.metrics.record_bytes("in", size);
        }
        let meta = Metadata::File(meta);
        let kind = if created { MutationKind::Upload } else { MutationKind::Update };
        fire_notification(state, kind, target, &meta, &identity);
        let status = if created { StatusCode::CREATED } else { StatusCode::OK };
        let doc = entity_document(&target.resource, &target.provider, &meta, None, &[]);
        return Ok(json_response(status, &doc));
    }

    // Update an existing file in place.
    let path = provider.validate_v1_path(&target.raw_path).await?;
    let stream = Box::new(IncomingBody { body, size: content_length });
    let (meta, created) = provider.upload(stream, &path).await?;
    if let Some(size) = meta.size {
        state.metrics.record_bytes("in", size);
    }
    let meta = Metadata::File(meta);
    fire_notification(state, MutationKind::Update, target, &meta, &identity);
    let status = if created { StatusCode::CREATED } else { StatusCode::OK };
    let doc = entity_document(&target.resource, &target.provider, &meta, None, &[]);
    Ok(json_response(status, &doc))
}

fn conflict_policy(raw: Option<&str>) -> GatewayResult<ConflictPolicy> {
    raw.map(ConflictPolicy::from_str)
        .transpose()
        .map(Option::unwrap_or_default)
}

// ============================================================================
// POST: rename, move, copy
// ============================================================================

#[derive(Deserialize)]
struct EntityAction {
    action: String,
    #[serde(default)]
    rename: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    conflict: Option<String>,
    #[serde(default)]
    resource: Option<String>,
    #[serde(default)]
    provider: Option<String>,
}

async fn handle_post(
    state: &Arc<Gateway>,
    req: Request<Incoming>,
    target: &Target,
    _query: &ApiQuery,
    tokens: &AuthTokens,
) -> GatewayResult<Response<GatewayBody>> {
    let (_, body) = req.into_parts();
    let bytes = Limited::new(body, ACTION_BODY_LIMIT)
        .collect()
        .await
        .map_err(|_| {
            GatewayError::InvalidArgument("unreadable or oversized action body".to_string())
        })?
        .to_bytes();
    let action: EntityAction = serde_json::from_slice(&bytes)
        .map_err(|err| GatewayError::InvalidArgument(format!("malformed action body: {err}")))?;
    let policy = conflict_policy(action.conflict.as_deref())?;
    let options = state.transfer_options();

    match action.action.as_str() {
        "rename" => {
            let new_name = action.rename.ok_or_else(|| {
                GatewayError::InvalidArgument("rename requires a rename field".to_string())
            })?;
            let (provider, identity) =
                materialize(state, &target.resource, &target.provider, Action::Write, tokens)
                    .await?;
            let path = provider.validate_v1_path(&target.raw_path).await?;
            let parent = path.parent();
            let outcome = sluice_engine::copy_or_move(
                TransferRequest {
                    source: provider.as_ref(),
                    source_path: &path,
                    dest: provider.as_ref(),
                    dest_folder: &parent,
                    rename: Some(new_name),
                    policy,
                    is_move: true,
                },
                &options,
            )
            .await?;
            fire_notification(state, MutationKind::Rename, target, &outcome.metadata, &identity);
            let doc = entity_document(
                &target.resource,
                &target.provider,
                &outcome.metadata,
                None,
                &outcome.warnings,
            );
            Ok(json_response(StatusCode::OK, &doc))
        }
        verb @ ("move" | "copy") => {
            let dest_raw = action.path.ok_or_else(|| {
                GatewayError::InvalidArgument(format!("{verb} requires a path field"))
            })?;
            if !dest_raw.ends_with('/') {
                return Err(GatewayError::InvalidPath(
                    "the destination of a move or copy is a folder path".to_string(),
                ));
            }
            let dest_resource = action.resource.unwrap_or_else(|| target.resource.clone());
            let dest_provider_name = action.provider.unwrap_or_else(|| target.provider.clone());

            let (source, _) =
                materialize(state, &target.resource, &target.provider, Action::CopyFrom, tokens)
                    .await?;
            let (dest, identity) =
                materialize(state, &dest_resource, &dest_provider_name, Action::CopyTo, tokens)
                    .await?;

            let source_path = source.validate_v1_path(&target.raw_path).await?;
            let dest_folder = dest.validate_v1_path(&dest_raw).await?;

            let is_move = verb == "move";
            let outcome = sluice_engine::copy_or_move(
                TransferRequest {
                    source: source.as_ref(),
                    source_path: &source_path,
                    dest: dest.as_ref(),
                    dest_folder: &dest_folder,
                    rename: action.rename,
                    policy,
                    is_move,
                },
                &options,
            )
            .await?;

            // Folder results list their immediate children.
            let children = match &outcome.metadata {
                Metadata::Folder(folder) => Some(dest.children(&folder.path).await?),
                Metadata::File(_) => None,
            };

            let dest_target = Target {
                resource: dest_resource.clone(),
                provider: dest_provider_name.clone(),
                raw_path: outcome.metadata.path().to_string(),
            };
            let kind = if is_move { MutationKind::Move } else { MutationKind::Copy };
            fire_notification(state, kind, &dest_target, &outcome.metadata, &identity);

            let status = if outcome.created {
                StatusCode::CREATED
            } else {
                StatusCode::OK
            };
            let doc = entity_document(
                &dest_resource,
                &dest_provider_name,
                &outcome.metadata,
                children.as_deref(),
                &outcome.warnings,
            );
            Ok(json_response(status, &doc))
        }
        other => Err(GatewayError::InvalidArgument(format!(
            "unknown action: {other}"
        ))),
    }
}

// ============================================================================
// DELETE
// ============================================================================

async fn handle_delete(
    state: &Arc<Gateway>,
    target: &Target,
    query: &ApiQuery,
    tokens: &AuthTokens,
) -> GatewayResult<Response<GatewayBody>> {
    let (provider, identity) =
        materialize(state, &target.resource, &target.provider, Action::Delete, tokens).await?;
    let path = provider.validate_v1_path(&target.raw_path).await?;
    provider.delete(&path, query.confirm_delete).await?;

    let event = ChangeEvent {
        action: MutationKind::Delete,
        resource: target.resource.clone(),
        provider: target.provider.clone(),
        path: path.to_string(),
        metadata: None,
        actor: identity,
        occurred_at: chrono::Utc::now(),
    };
    spawn_notification(state, event);

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .body(empty_body())
        .unwrap())
}

// ============================================================================
// Notification plumbing
// ============================================================================

fn fire_notification(
    state: &Arc<Gateway>,
    kind: MutationKind,
    target: &Target,
    meta: &Metadata,
    identity: &CallerIdentity,
) {
    let event = ChangeEvent {
        action: kind,
        resource: target.resource.clone(),
        provider: target.provider.clone(),
        path: meta.path().to_string(),
        metadata: Some(meta.attributes()),
        actor: identity.clone(),
        occurred_at: chrono::Utc::now(),
    };
    spawn_notification(state, event);
}

/// Detached delivery: a failing or slow hook never affects the response.
fn spawn_notification(state: &Arc<Gateway>, event: ChangeEvent) {
    let notifier = Arc::clone(&state.notifier);
    tokio::spawn(async move {
        if let Err(err) = notifier.notify(&event).await {
            warn!(error = %err, action = ?event.action, "notification hook failed");
        }
    });
}

/// Adapter from a hyper request body to the core stream contract.
struct IncomingBody {
    body: Incoming,
    size: Option<u64>,
}

#[async_trait]
impl ByteStream for IncomingBody {
    fn size(&self) -> Option<u64> {
        self.size
    }

    async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>> {
        loop {
            match self.body.frame().await {
                None => return Ok(None),
                Some(Err(err)) => {
                    return Err(GatewayError::Unexpected(format!(
                        "request body error: {err}"
                    )))
                }
                Some(Ok(frame)) => {
                    if let Ok(data) = frame.into_data() {
                        return Ok(Some(data));
                    }
                    // Non-data frames (trailers) are skipped.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_target_splits_and_decodes() {
        let target = parse_target("r1/providers/memstore/docs/a%20b.txt").unwrap();
        assert_eq!(target.resource, "r1");
        assert_eq!(target.provider, "memstore");
        assert_eq!(target.raw_path, "/docs/a b.txt");
    }

    #[test]
    fn test_parse_target_preserves_trailing_slash() {
        let target = parse_target("r1/providers/memstore/docs/").unwrap();
        assert_eq!(target.raw_path, "/docs/");
        let target = parse_target("r1/providers/memstore/").unwrap();
        assert_eq!(target.raw_path, "/");
    }

    #[test]
    fn test_parse_target_rejects_missing_pieces() {
        assert!(parse_target("r1").is_err());
        assert!(parse_target("r1/providers/memstore").is_err());
        assert!(parse_target("r1/notproviders/memstore/").is_err());
    }

    #[test]
    fn test_escaped_separator_cannot_change_structure() {
        let err = parse_target("r1/providers/memstore/a%2Fb").unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn test_infer_action() {
        assert_eq!(infer_action(&Method::GET), Action::Read);
        assert_eq!(infer_action(&Method::PUT), Action::Write);
        assert_eq!(infer_action(&Method::DELETE), Action::Delete);
        assert_eq!(infer_action(&Method::POST), Action::CopyFrom);
    }

    #[test]
    fn test_parse_range_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_range_header(&headers).unwrap(), None);

        headers.insert("Range", HeaderValue::from_static("bytes=0-4"));
        assert_eq!(
            parse_range_header(&headers).unwrap(),
            Some(ByteRange { start: 0, end: Some(4) })
        );

        headers.insert("Range", HeaderValue::from_static("bytes=6-"));
        assert_eq!(
            parse_range_header(&headers).unwrap(),
            Some(ByteRange { start: 6, end: None })
        );

        headers.insert("Range", HeaderValue::from_static("items=1-2"));
        assert!(parse_range_header(&headers).is_err());
    }

    #[test]
    fn test_extract_tokens_prefers_header_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer tok-1"));
        headers.insert("Cookie", HeaderValue::from_static("session=abc"));
        let query = ApiQuery::parse(Some("cookie=fallback&view_only=vo"));
        let tokens = extract_tokens(&headers, &query, Some("10.0.0.1".to_string()));
        assert_eq!(tokens.bearer.as_deref(), Some("tok-1"));
        assert_eq!(tokens.cookie.as_deref(), Some("session=abc"));
        assert_eq!(tokens.view_only.as_deref(), Some("vo"));

        let tokens = extract_tokens(&HeaderMap::new(), &query, None);
        assert_eq!(tokens.cookie.as_deref(), Some("fallback"));
    }

    #[test]
    fn test_conflict_policy_defaults_to_warn() {
        assert_eq!(conflict_policy(None).unwrap(), ConflictPolicy::Warn);
        assert_eq!(conflict_policy(Some("keep")).unwrap(), ConflictPolicy::Keep);
        assert!(conflict_policy(Some("bogus")).is_err());
    }
}

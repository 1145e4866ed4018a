//! Copy/move engine
//!
//! Orchestrates copy and move between two per-request providers: resolves
//! the destination name, dispatches to a native intra-provider operation
//! when the backends share storage, and otherwise streams bytes source to
//! destination with digests computed on the wire. Folder trees recurse
//! sequentially in the source's natural order.
//!
//! Moves are delete-after-verify: the source is removed only once the
//! destination's content has been checked. A failed source delete does not
//! fail the operation; it surfaces as a warning on the outcome.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use sluice_core::errors::{GatewayError, GatewayResult};
use sluice_core::metadata::{FileMetadata, Metadata};
use sluice_core::path::StoragePath;
use sluice_core::provider::{Download, StorageProvider};
use sluice_core::streams::{ByteStream, HashAlgorithm, HashStream};

use crate::naming::{self, ConflictPolicy};

/// Engine tuning, sourced from `transfer` configuration.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Abort when no byte moves for this long.
    pub inactivity_timeout: Duration,
    /// Cap on the conflict=keep suffix search.
    pub keep_suffix_cap: u32,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            inactivity_timeout: Duration::from_secs(600),
            keep_suffix_cap: 999,
        }
    }
}

/// One copy or move to perform.
pub struct TransferRequest<'a> {
    pub source: &'a dyn StorageProvider,
    pub source_path: &'a StoragePath,
    pub dest: &'a dyn StorageProvider,
    /// Destination folder the (possibly renamed) leaf lands in.
    pub dest_folder: &'a StoragePath,
    pub rename: Option<String>,
    pub policy: ConflictPolicy,
    pub is_move: bool,
}

/// What a finished transfer reports.
#[derive(Debug)]
pub struct TransferOutcome {
    pub metadata: Metadata,
    /// False when an existing destination entity was overwritten.
    pub created: bool,
    /// Non-fatal problems, e.g. a move whose source delete failed.
    pub warnings: Vec<String>,
}

/// Executes a copy or move request.
pub async fn copy_or_move(
    req: TransferRequest<'_>,
    opts: &TransferOptions,
) -> GatewayResult<TransferOutcome> {
    if !req.dest_folder.is_folder() {
        return Err(GatewayError::InvalidPath(format!(
            "destination must be a folder, got {}",
            req.dest_folder
        )));
    }
    if req.source_path.is_root() {
        return Err(GatewayError::InvalidArgument(
            "the provider root cannot be copied or moved".to_string(),
        ));
    }

    let folder = req.source_path.is_folder();
    let leaf = req
        .rename
        .clone()
        .unwrap_or_else(|| req.source_path.name().to_string());

    // Moving an entity onto itself is a no-op, not a conflict.
    let naive_dest = req.dest_folder.child(&leaf, folder)?;
    if req.is_move
        && req.source.shares_storage_root(req.dest)
        && naive_dest.to_string() == req.source_path.to_string()
    {
        let metadata = req.source.metadata(req.source_path, None).await?;
        return Ok(TransferOutcome { metadata, created: false, warnings: Vec::new() });
    }

    let resolved = naming::resolve_destination(
        req.dest,
        req.dest_folder,
        &leaf,
        folder,
        req.policy,
        opts.keep_suffix_cap,
    )
    .await?;
    let created = resolved.existing.is_none();
    let dest_path = resolved.path;

    // In-place overwrite is only well-defined file-over-file; anything
    // involving a folder clears the old entity first.
    if let Some(existing) = &resolved.existing {
        if folder || !existing.is_file() {
            req.dest.delete(&dest_path, false).await?;
        }
    }

    debug!(
        source = %req.source_path,
        destination = %dest_path,
        is_move = req.is_move,
        "dispatching transfer"
    );

    let mut warnings = Vec::new();

    let metadata = if req.is_move && req.source.can_intra_move(req.dest, req.source_path) {
        let (meta, _) = req
            .source
            .intra_move(req.dest, req.source_path, &dest_path)
            .await?;
        meta
    } else if !req.is_move && req.source.can_intra_copy(req.dest, req.source_path) {
        let (meta, _) = req
            .source
            .intra_copy(req.dest, req.source_path, &dest_path)
            .await?;
        meta
    } else {
        let meta = if folder {
            let folder_meta = req.dest.create_folder(&dest_path).await?;
            copy_children(req.source, req.source_path, req.dest, &dest_path, opts).await?;
            Metadata::Folder(folder_meta)
        } else {
            Metadata::File(
                stream_file(req.source, req.source_path, req.dest, &dest_path, opts).await?,
            )
        };
        if req.is_move {
            // Delete-after-verify: the copy above already checked content.
            if let Err(err) = req.source.delete(req.source_path, false).await {
                warn!(
                    source = %req.source_path,
                    error = %err,
                    "move copied successfully but source cleanup failed"
                );
                warnings.push(format!(
                    "partial move: content now at {dest_path}, but deleting source {} failed: {err}",
                    req.source_path
                ));
            }
        }
        meta
    };

    Ok(TransferOutcome { metadata, created, warnings })
}

/// Recursively copies folder contents. Children inherit replace semantics;
/// conflict resolution applies at the top level only.
fn copy_children<'a>(
    source: &'a dyn StorageProvider,
    src_folder: &'a StoragePath,
    dest: &'a dyn StorageProvider,
    dest_folder: &'a StoragePath,
    opts: &'a TransferOptions,
) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send + 'a>> {
    Box::pin(async move {
        let children = source.children(src_folder).await?;
        for child in children {
            let src_child = source.path_from_metadata(src_folder, &child)?;
            match &child {
                Metadata::Folder(_) => {
                    let dst_child = dest_folder.child(child.name(), true)?;
                    dest.create_folder(&dst_child)
                        .await
                        .map_err(|err| at_path(err, &src_child))?;
                    copy_children(source, &src_child, dest, &dst_child, opts).await?;
                }
                Metadata::File(_) => {
                    let dst_child = dest_folder.child(child.name(), false)?;
                    if source.can_intra_copy(dest, &src_child) {
                        source
                            .intra_copy(dest, &src_child, &dst_child)
                            .await
                            .map_err(|err| at_path(err, &src_child))?;
                    } else {
                        stream_file(source, &src_child, dest, &dst_child, opts)
                            .await
                            .map_err(|err| at_path(err, &src_child))?;
                    }
                }
            }
        }
        Ok(())
    })
}

/// Streams one file source to destination, hashing on the wire and
/// verifying the result against whatever the destination reports.
async fn stream_file(
    source: &dyn StorageProvider,
    src_path: &StoragePath,
    dest: &dyn StorageProvider,
    dest_path: &StoragePath,
    opts: &TransferOptions,
) -> GatewayResult<FileMetadata> {
    let download = source.download(src_path, None, None, true).await?;
    let stream = match download {
        Download::Stream(stream) => stream,
        Download::Redirect(_) => {
            return Err(GatewayError::Unexpected(
                "provider returned a redirect for a proxied download".to_string(),
            ))
        }
    };

    let wire_digests: Arc<Mutex<Option<BTreeMap<String, String>>>> = Arc::default();
    let transferred = Arc::new(AtomicU64::new(0));
    let tapped = TappedStream {
        inner: HashStream::new(stream, &[HashAlgorithm::Sha256, HashAlgorithm::Md5]),
        timeout: opts.inactivity_timeout,
        digests: Arc::clone(&wire_digests),
        bytes: Arc::clone(&transferred),
    };

    let (mut dest_meta, _) = dest.upload(Box::new(tapped), dest_path).await?;

    let transferred = transferred.load(Ordering::Relaxed);
    let wire = wire_digests.lock().unwrap().take();
    verify_transfer(&wire, &dest_meta, transferred)?;

    // Surface the on-the-wire digests on the returned metadata for any
    // algorithm the destination did not report itself.
    if let Some(wire) = wire {
        for (algorithm, digest) in wire {
            dest_meta.hashes.entry(algorithm).or_insert(digest);
        }
    }
    Ok(dest_meta)
}

/// Hash verification rules: a shared algorithm must agree; with no shared
/// algorithm a single reported value is trusted; with none at all, sizes
/// must agree when both are known.
fn verify_transfer(
    wire: &Option<BTreeMap<String, String>>,
    dest_meta: &FileMetadata,
    transferred: u64,
) -> GatewayResult<()> {
    if let Some(wire) = wire {
        let mut compared = false;
        for (algorithm, wire_hex) in wire {
            if let Some(dest_hex) = dest_meta.hashes.get(algorithm) {
                compared = true;
                if dest_hex != wire_hex {
                    return Err(GatewayError::HashMismatch {
                        algorithm: algorithm.clone(),
                        source_hash: wire_hex.clone(),
                        destination: dest_hex.clone(),
                    });
                }
            }
        }
        if compared {
            return Ok(());
        }
    }
    if let Some(size) = dest_meta.size {
        if size != transferred {
            return Err(GatewayError::Provider(format!(
                "destination recorded {size} bytes but {transferred} were transferred"
            )));
        }
    }
    Ok(())
}

/// Stream wrapper the engine feeds into the destination: enforces the
/// inactivity timeout and exposes digests/byte counts after the
/// destination has drained it.
struct TappedStream {
    inner: HashStream,
    timeout: Duration,
    digests: Arc<Mutex<Option<BTreeMap<String, String>>>>,
    bytes: Arc<AtomicU64>,
}

#[async_trait]
impl ByteStream for TappedStream {
    fn size(&self) -> Option<u64> {
        self.inner.size()
    }

    async fn next_chunk(&mut self) -> GatewayResult<Option<Bytes>> {
        let chunk = tokio::time::timeout(self.timeout, self.inner.next_chunk())
            .await
            .map_err(|_| {
                GatewayError::ServiceUnavailable(format!(
                    "transfer stalled for {} seconds",
                    self.timeout.as_secs()
                ))
            })??;
        match &chunk {
            Some(chunk) => {
                self.bytes.fetch_add(chunk.len() as u64, Ordering::Relaxed);
            }
            None => {
                *self.digests.lock().unwrap() = self.inner.digests().cloned();
            }
        }
        Ok(chunk)
    }
}

/// Attaches the failing path to an error surfacing out of folder
/// recursion, preserving its kind.
fn at_path(err: GatewayError, path: &StoragePath) -> GatewayError {
    use GatewayError::*;
    match err {
        InvalidPath(m) => InvalidPath(format!("{m} (at {path})")),
        InvalidArgument(m) => InvalidArgument(format!("{m} (at {path})")),
        NotFound(m) => NotFound(format!("{m} (at {path})")),
        NotSupported(m) => NotSupported(format!("{m} (at {path})")),
        Gone(m) => Gone(format!("{m} (at {path})")),
        PayloadTooLarge(m) => PayloadTooLarge(format!("{m} (at {path})")),
        NotImplemented(m) => NotImplemented(format!("{m} (at {path})")),
        ServiceUnavailable(m) => ServiceUnavailable(format!("{m} (at {path})")),
        Provider(m) => Provider(format!("{m} (at {path})")),
        Unexpected(m) => Unexpected(format!("{m} (at {path})")),
        other => other,
    }
}

//! Folder-to-ZIP assembly
//!
//! Walks a folder tree, collects its files in lexical order of their
//! posix-relative paths, and feeds them one at a time into the core
//! [`ZipStream`]. The provider is taken by value: per-request providers
//! are owned, and the archive outlives any borrow of the walk.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use sluice_core::errors::{GatewayError, GatewayResult};
use sluice_core::metadata::Metadata;
use sluice_core::path::StoragePath;
use sluice_core::provider::{Download, StorageProvider};
use sluice_core::streams::{ZipEntry, ZipEntrySource, ZipStream};

/// One file discovered by the walk, not yet opened.
struct PendingEntry {
    relative_path: String,
    path: StoragePath,
    modified: Option<DateTime<Utc>>,
}

/// Builds a single-pass ZIP archive of `path`'s contents.
pub async fn zip_folder(
    provider: Box<dyn StorageProvider>,
    path: &StoragePath,
) -> GatewayResult<ZipStream> {
    if !path.is_folder() {
        return Err(GatewayError::InvalidPath(format!(
            "only folders can be zipped, got {path}"
        )));
    }

    let mut entries = Vec::new();
    walk(provider.as_ref(), path, String::new(), &mut entries).await?;
    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    Ok(ZipStream::new(Box::new(WalkedSource {
        provider,
        pending: entries.into(),
    })))
}

/// Depth-first walk collecting files with their archive-relative paths.
fn walk<'a>(
    provider: &'a dyn StorageProvider,
    folder: &'a StoragePath,
    prefix: String,
    out: &'a mut Vec<PendingEntry>,
) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send + 'a>> {
    Box::pin(async move {
        for child in provider.children(folder).await? {
            let child_path = provider.path_from_metadata(folder, &child)?;
            match &child {
                Metadata::File(meta) => out.push(PendingEntry {
                    relative_path: format!("{prefix}{}", meta.name),
                    path: child_path,
                    modified: meta.modified,
                }),
                Metadata::Folder(meta) => {
                    let prefix = format!("{prefix}{}/", meta.name);
                    walk(provider, &child_path, prefix, out).await?;
                }
            }
        }
        Ok(())
    })
}

/// Opens each pending file lazily, so at most one backend stream is live.
struct WalkedSource {
    provider: Box<dyn StorageProvider>,
    pending: VecDeque<PendingEntry>,
}

#[async_trait]
impl ZipEntrySource for WalkedSource {
    async fn next_entry(&mut self) -> GatewayResult<Option<ZipEntry>> {
        let Some(entry) = self.pending.pop_front() else {
            return Ok(None);
        };
        let stream = match self
            .provider
            .download(&entry.path, None, None, true)
            .await?
        {
            Download::Stream(stream) => stream,
            Download::Redirect(_) => {
                return Err(GatewayError::Unexpected(
                    "provider returned a redirect for a proxied download".to_string(),
                ))
            }
        };
        Ok(Some(ZipEntry {
            path: entry.relative_path,
            modified: entry.modified,
            stream,
        }))
    }
}

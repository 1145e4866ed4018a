//! Local filesystem backend
//!
//! Serves each resource out of a subdirectory of a configured root.
//! Streams through `tokio::fs`, uploads land via write-to-temp plus atomic
//! rename, and native copy/move kick in when source and destination point
//! at the same resource directory.
//!
//! No revision history: the single current state is exposed as one
//! revision keyed by mtime.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use sluice_core::errors::{GatewayError, GatewayResult};
use sluice_core::metadata::{FileMetadata, FolderMetadata, Metadata, RevisionMetadata};
use sluice_core::path::StoragePath;
use sluice_core::provider::{ByteRange, Download, StorageProvider};
use sluice_core::streams::{
    verify_declared_size, BoxStream, ByteStream, FileStream, HashAlgorithm, HashStream,
};

pub const PROVIDER_NAME: &str = "localfs";

/// Filesystem-backed provider bound to one resource subdirectory.
pub struct LocalFs {
    resource_root: PathBuf,
}

impl LocalFs {
    /// Binds `resource` under `root`. The resource id doubles as a
    /// directory name and must not contain separators.
    pub fn new(root: impl Into<PathBuf>, resource: &str) -> GatewayResult<Self> {
        if resource.is_empty()
            || resource.contains('/')
            || resource.contains('\\')
            || resource == "."
            || resource == ".."
        {
            return Err(GatewayError::InvalidArgument(format!(
                "invalid resource id: {resource}"
            )));
        }
        Ok(Self { resource_root: root.into().join(resource) })
    }

    fn absolute(&self, path: &StoragePath) -> PathBuf {
        let mut abs = self.resource_root.clone();
        for part in path.parts() {
            abs.push(part.name());
        }
        abs
    }

    async fn ensure_root(&self) -> GatewayResult<()> {
        tokio::fs::create_dir_all(&self.resource_root).await?;
        Ok(())
    }

    async fn file_metadata(&self, path: &StoragePath) -> GatewayResult<FileMetadata> {
        let abs = self.absolute(path);
        let stat = tokio::fs::metadata(&abs)
            .await
            .map_err(|_| GatewayError::NotFound(path.to_string()))?;
        if !stat.is_file() {
            return Err(GatewayError::NotFound(path.to_string()));
        }
        let modified = stat.modified().ok().map(DateTime::<Utc>::from);
        let mut meta = FileMetadata::new(PROVIDER_NAME, path.clone());
        meta.size = Some(stat.len());
        meta.modified = modified;
        meta.etag = Some(etag_for(stat.len(), stat.modified().ok()));
        meta.content_type = None;
        Ok(meta)
    }
}

fn etag_for(size: u64, modified: Option<SystemTime>) -> String {
    let stamp = modified
        .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    hex::encode(Sha256::digest(format!("{stamp}:{size}")))
}

fn version_for(modified: Option<SystemTime>) -> String {
    modified
        .and_then(|m| m.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|| "0".to_string())
}

/// Recursive directory copy preserving structure.
fn copy_dir<'a>(
    from: &'a Path,
    to: &'a Path,
) -> Pin<Box<dyn Future<Output = GatewayResult<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(to).await?;
        let mut entries = tokio::fs::read_dir(from).await?;
        while let Some(entry) = entries.next_entry().await? {
            let target = to.join(entry.file_name());
            if entry.file_type().await?.is_dir() {
                copy_dir(&entry.path(), &target).await?;
            } else {
                tokio::fs::copy(entry.path(), target).await?;
            }
        }
        Ok(())
    })
}

#[async_trait]
impl StorageProvider for LocalFs {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn storage_root_id(&self) -> String {
        self.resource_root.display().to_string()
    }

    async fn validate_v1_path(&self, raw: &str) -> GatewayResult<StoragePath> {
        let path = StoragePath::parse(raw)?;
        if path.is_root() {
            return Ok(path);
        }
        let stat = tokio::fs::metadata(self.absolute(&path))
            .await
            .map_err(|_| GatewayError::NotFound(path.to_string()))?;
        if stat.is_dir() != path.is_folder() {
            return Err(GatewayError::NotFound(path.to_string()));
        }
        Ok(path)
    }

    async fn validate_path(&self, raw: &str) -> GatewayResult<StoragePath> {
        StoragePath::parse(raw)
    }

    async fn metadata(&self, path: &StoragePath, version: Option<&str>) -> GatewayResult<Metadata> {
        if path.is_folder() {
            if !path.is_root() {
                let stat = tokio::fs::metadata(self.absolute(path))
                    .await
                    .map_err(|_| GatewayError::NotFound(path.to_string()))?;
                if !stat.is_dir() {
                    return Err(GatewayError::NotFound(path.to_string()));
                }
            }
            return Ok(Metadata::Folder(FolderMetadata::new(
                PROVIDER_NAME,
                path.clone(),
            )));
        }
        let meta = self.file_metadata(path).await?;
        if let Some(version) = version {
            let current = version_for(meta.modified.map(SystemTime::from));
            if version != current {
                return Err(GatewayError::NotFound(format!(
                    "{path} has no version {version}"
                )));
            }
        }
        Ok(Metadata::File(meta))
    }

    async fn children(&self, path: &StoragePath) -> GatewayResult<Vec<Metadata>> {
        if !path.is_folder() {
            return Err(GatewayError::InvalidPath(format!(
                "cannot list a file: {path}"
            )));
        }
        let abs = self.absolute(path);
        if path.is_root() && tokio::fs::metadata(&abs).await.is_err() {
            // A resource nobody has written to yet is an empty root.
            return Ok(Vec::new());
        }
        let mut dir = tokio::fs::read_dir(&abs)
            .await
            .map_err(|_| GatewayError::NotFound(path.to_string()))?;
        let mut out = Vec::new();
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if entry.file_type().await?.is_dir() {
                let child = path.child(&name, true)?;
                out.push(Metadata::Folder(FolderMetadata::new(PROVIDER_NAME, child)));
            } else {
                let child = path.child(&name, false)?;
                out.push(Metadata::File(self.file_metadata(&child).await?));
            }
        }
        Ok(out)
    }

    async fn download(
        &self,
        path: &StoragePath,
        version: Option<&str>,
        range: Option<ByteRange>,
        _proxy: bool,
    ) -> GatewayResult<Download> {
        if path.is_folder() {
            return Err(GatewayError::NotFound(path.to_string()));
        }
        // There is only the current state; reject stale version selectors.
        if version.is_some() {
            self.metadata(path, version).await?;
        }
        let abs = self.absolute(path);
        let stream = match range {
            None => FileStream::open(&abs).await.map_err(not_found_as(path))?,
            Some(ByteRange { start, end }) => FileStream::open_range(&abs, start, end)
                .await
                .map_err(not_found_as(path))?,
        };
        Ok(Download::Stream(Box::new(stream)))
    }

    async fn upload(
        &self,
        stream: BoxStream,
        path: &StoragePath,
    ) -> GatewayResult<(FileMetadata, bool)> {
        if path.is_folder() {
            return Err(GatewayError::InvalidPath(format!(
                "cannot upload to a folder path: {path}"
            )));
        }
        self.ensure_root().await?;

        let abs = self.absolute(path);
        let parent = abs
            .parent()
            .ok_or_else(|| GatewayError::InvalidPath(path.to_string()))?;
        if tokio::fs::metadata(parent).await.is_err() {
            return Err(GatewayError::NotFound(path.parent().to_string()));
        }
        if let Ok(stat) = tokio::fs::metadata(&abs).await {
            if stat.is_dir() {
                return Err(GatewayError::NamingConflict {
                    name: path.name().to_string(),
                });
            }
        }
        let existed = tokio::fs::metadata(&abs).await.is_ok();

        let declared = stream.size();
        let mut hashed = HashStream::new(stream, &[HashAlgorithm::Sha256, HashAlgorithm::Md5]);

        // Stage into a sibling temp file, then rename into place.
        let staging = parent.join(format!(".{}.{}", path.name(), Uuid::new_v4()));
        let result = async {
            let mut out = tokio::fs::File::create(&staging).await?;
            while let Some(chunk) = hashed.next_chunk().await? {
                tokio::io::AsyncWriteExt::write_all(&mut out, &chunk).await?;
            }
            tokio::io::AsyncWriteExt::flush(&mut out).await?;
            verify_declared_size(declared, hashed.bytes_read())?;
            tokio::fs::rename(&staging, &abs).await?;
            Ok(())
        }
        .await;
        if let Err(err) = result {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err);
        }
        debug!(path = %path, bytes = hashed.bytes_read(), "file written");

        let mut meta = self.file_metadata(path).await?;
        if let Some(digests) = hashed.digests() {
            meta.hashes = digests.clone();
        }
        Ok((meta, !existed))
    }

    async fn delete(&self, path: &StoragePath, confirm_delete: bool) -> GatewayResult<()> {
        if path.is_root() {
            if !confirm_delete {
                return Err(GatewayError::InvalidArgument(
                    "deleting the root requires confirm_delete".to_string(),
                ));
            }
            let abs = self.absolute(path);
            if tokio::fs::metadata(&abs).await.is_err() {
                return Ok(());
            }
            let mut dir = tokio::fs::read_dir(&abs).await?;
            while let Some(entry) = dir.next_entry().await? {
                if entry.file_type().await?.is_dir() {
                    tokio::fs::remove_dir_all(entry.path()).await?;
                } else {
                    tokio::fs::remove_file(entry.path()).await?;
                }
            }
            return Ok(());
        }

        let abs = self.absolute(path);
        let stat = tokio::fs::metadata(&abs)
            .await
            .map_err(|_| GatewayError::NotFound(path.to_string()))?;
        if stat.is_dir() != path.is_folder() {
            return Err(GatewayError::NotFound(path.to_string()));
        }
        if stat.is_dir() {
            tokio::fs::remove_dir_all(&abs).await?;
        } else {
            tokio::fs::remove_file(&abs).await?;
        }
        Ok(())
    }

    async fn create_folder(&self, path: &StoragePath) -> GatewayResult<FolderMetadata> {
        if !path.is_folder() {
            return Err(GatewayError::InvalidPath(format!(
                "folder paths end in a slash: {path}"
            )));
        }
        if path.is_root() {
            return Err(GatewayError::InvalidArgument(
                "the root already exists".to_string(),
            ));
        }
        self.ensure_root().await?;
        let abs = self.absolute(path);
        match tokio::fs::create_dir(&abs).await {
            Ok(()) => Ok(FolderMetadata::new(PROVIDER_NAME, path.clone())),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(GatewayError::NamingConflict { name: path.name().to_string() })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(GatewayError::NotFound(path.parent().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn revisions(&self, path: &StoragePath) -> GatewayResult<Vec<RevisionMetadata>> {
        let meta = self.file_metadata(path).await?;
        Ok(vec![RevisionMetadata {
            version: version_for(meta.modified.map(SystemTime::from)),
            modified: meta.modified,
            author: None,
            extra: serde_json::Map::new(),
        }])
    }

    fn can_duplicate_names(&self) -> bool {
        false
    }

    fn can_intra_copy(&self, dest: &dyn StorageProvider, _path: &StoragePath) -> bool {
        self.shares_storage_root(dest)
    }

    fn can_intra_move(&self, dest: &dyn StorageProvider, _path: &StoragePath) -> bool {
        self.shares_storage_root(dest)
    }

    async fn intra_copy(
        &self,
        _dest: &dyn StorageProvider,
        source: &StoragePath,
        destination: &StoragePath,
    ) -> GatewayResult<(Metadata, bool)> {
        let from = self.absolute(source);
        let to = self.absolute(destination);
        if source.is_folder() {
            copy_dir(&from, &to).await?;
            Ok((
                Metadata::Folder(FolderMetadata::new(PROVIDER_NAME, destination.clone())),
                true,
            ))
        } else {
            tokio::fs::copy(&from, &to)
                .await
                .map_err(GatewayError::from)
                .map_err(not_found_as(source))?;
            Ok((Metadata::File(self.file_metadata(destination).await?), true))
        }
    }

    async fn intra_move(
        &self,
        _dest: &dyn StorageProvider,
        source: &StoragePath,
        destination: &StoragePath,
    ) -> GatewayResult<(Metadata, bool)> {
        let from = self.absolute(source);
        let to = self.absolute(destination);
        tokio::fs::rename(&from, &to)
            .await
            .map_err(GatewayError::from)
            .map_err(not_found_as(source))?;
        let meta = if destination.is_folder() {
            Metadata::Folder(FolderMetadata::new(PROVIDER_NAME, destination.clone()))
        } else {
            Metadata::File(self.file_metadata(destination).await?)
        };
        Ok((meta, true))
    }
}

fn not_found_as(path: &StoragePath) -> impl FnOnce(GatewayError) -> GatewayError + '_ {
    move |err| match err {
        GatewayError::NotFound(_) => GatewayError::NotFound(path.to_string()),
        other => other,
    }
}

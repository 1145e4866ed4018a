//! Storage provider contract
//!
//! Every backend adapter implements [`StorageProvider`]. Instances are
//! ephemeral: the pipeline constructs one per request from the auth
//! handler's credentials+settings bundle and drops it when the request
//! ends. An instance holds no cross-request state beyond an owned HTTP
//! client that may pool connections internally.
//!
//! Operations expressible in terms of the primitives (existence probes,
//! path revalidation, default native-move) have provided implementations
//! here; the copy/move orchestration and folder zipping live in the engine
//! crate as free functions over `dyn StorageProvider`.

use async_trait::async_trait;

use crate::errors::{GatewayError, GatewayResult};
use crate::metadata::{FileMetadata, FolderMetadata, Metadata, RevisionMetadata};
use crate::path::StoragePath;
use crate::streams::BoxStream;

/// An inclusive byte range requested for a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    /// Inclusive end; `None` means to end of file.
    pub end: Option<u64>,
}

/// What a provider hands back for a download request.
pub enum Download {
    /// Bytes the pipeline proxies to the client.
    Stream(BoxStream),
    /// A signed URL the pipeline answers with a 302. Providers may only
    /// return this when the caller did not force proxying.
    Redirect(String),
}

/// The uniform backend interface.
///
/// Adapters normalise every backend failure into the gateway error
/// taxonomy; raw backend status codes never cross this boundary.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Provider kind, e.g. "memstore". Matches the `provider` field of all
    /// metadata this adapter produces.
    fn name(&self) -> &str;


    /// Identity of the backing store. Two providers index the same bytes
    /// iff their names and storage-root ids both match.
    fn storage_root_id(&self) -> String;

    /// Parses and validates a raw path against the live backend: the entity
    /// must exist and its kind must match the trailing-slash convention.
    /// A kind mismatch is `NotFound`, not `InvalidPath`.
    async fn validate_v1_path(&self, raw: &str) -> GatewayResult<StoragePath>;

    /// Looser parse used for destinations of create/move/copy: syntactic
    /// validation only, no existence requirement.
    async fn validate_path(&self, raw: &str) -> GatewayResult<StoragePath>;

    /// Metadata for a file (optionally at a given version), or folder
    /// metadata for a folder path.
    async fn metadata(&self, path: &StoragePath, version: Option<&str>) -> GatewayResult<Metadata>;

    /// Immediate children of a folder, in the provider's natural order.
    /// Callers must not assume alphabetical ordering.
    async fn children(&self, path: &StoragePath) -> GatewayResult<Vec<Metadata>>;

    /// Opens a file for reading. When `proxy` is false the provider may
    /// answer with a signed [`Download::Redirect`]; when `proxy` is true it
    /// must produce a stream.
    async fn download(
        &self,
        path: &StoragePath,
        version: Option<&str>,
        range: Option<ByteRange>,
        proxy: bool,
    ) -> GatewayResult<Download>;

    /// Writes a file. Returns the new metadata and `created`: true when a
    /// new object came into being, false when an existing one was replaced.
    ///
    /// Implementations compute at least one content hash while the bytes
    /// pass through and fail with `UploadIncomplete` when the stream's
    /// declared size disagrees with what arrived.
    async fn upload(
        &self,
        stream: BoxStream,
        path: &StoragePath,
    ) -> GatewayResult<(FileMetadata, bool)>;

    /// Deletes an entity. Deleting the root requires `confirm_delete` and
    /// clears all children while leaving the root itself in place.
    async fn delete(&self, path: &StoragePath, confirm_delete: bool) -> GatewayResult<()>;

    /// Creates a folder. Providers that cannot fail with `NotSupported`.
    async fn create_folder(&self, path: &StoragePath) -> GatewayResult<FolderMetadata>;

    /// Revision history for a file, newest first.
    async fn revisions(&self, path: &StoragePath) -> GatewayResult<Vec<RevisionMetadata>>;

    /// Whether two sibling entries may share a name (ids disambiguate).
    fn can_duplicate_names(&self) -> bool {
        true
    }

    /// True iff `other` indexes the same bytes as `self`.
    fn shares_storage_root(&self, other: &dyn StorageProvider) -> bool {
        self.name() == other.name() && self.storage_root_id() == other.storage_root_id()
    }

    /// True iff a native server-side copy to `dest` is possible for `path`.
    fn can_intra_copy(&self, _dest: &dyn StorageProvider, _path: &StoragePath) -> bool {
        false
    }

    /// True iff a native server-side move to `dest` is possible for `path`.
    fn can_intra_move(&self, _dest: &dyn StorageProvider, _path: &StoragePath) -> bool {
        false
    }

    /// Native copy; called only when [`Self::can_intra_copy`] returned true.
    async fn intra_copy(
        &self,
        _dest: &dyn StorageProvider,
        _source: &StoragePath,
        _destination: &StoragePath,
    ) -> GatewayResult<(Metadata, bool)> {
        Err(GatewayError::NotImplemented(
            "native copy is not available on this provider".to_string(),
        ))
    }

    /// Native move; called only when [`Self::can_intra_move`] returned
    /// true. Defaults to native copy followed by source delete.
    async fn intra_move(
        &self,
        dest: &dyn StorageProvider,
        source: &StoragePath,
        destination: &StoragePath,
    ) -> GatewayResult<(Metadata, bool)> {
        let outcome = self.intra_copy(dest, source, destination).await?;
        self.delete(source, false).await?;
        Ok(outcome)
    }

    /// Existence probe expressed via [`Self::metadata`]; `NotFound` becomes
    /// `None`, every other failure propagates.
    async fn exists(&self, path: &StoragePath) -> GatewayResult<Option<Metadata>> {
        match self.metadata(path, None).await {
            Ok(meta) => Ok(Some(meta)),
            Err(GatewayError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Builds a child path under `base`, letting adapters that resolve ids
    /// override with a backend round trip.
    async fn revalidate_path(
        &self,
        base: &StoragePath,
        name: &str,
        folder: bool,
    ) -> GatewayResult<StoragePath> {
        base.child(name, folder)
    }

    /// Child path for a listed entry, carrying over the entry's id.
    fn path_from_metadata(
        &self,
        parent: &StoragePath,
        meta: &Metadata,
    ) -> GatewayResult<StoragePath> {
        parent.child_with_id(
            meta.name(),
            !meta.is_file(),
            meta.path().identifier().map(str::to_string),
        )
    }
}

impl std::fmt::Debug for dyn StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageProvider")
            .field("name", &self.name())
            .finish()
    }
}

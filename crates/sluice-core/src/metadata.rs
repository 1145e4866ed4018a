//! Entity metadata model
//!
//! Tagged metadata variants returned by provider adapters. The shape is a
//! fixed schema; anything backend-specific travels in the `extra` map and
//! is never accessed ad hoc by callers.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path::StoragePath;

/// Metadata for a file entry.
///
/// `hashes` maps lowercase algorithm names ("sha256", "md5") to lowercase
/// hex digests. `size` and the timestamps are optional because some
/// backends simply do not report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub path: StoragePath,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub modified: Option<DateTime<Utc>>,
    pub created: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub hashes: BTreeMap<String, String>,
    pub provider: String,
    pub extra: Map<String, Value>,
}

impl FileMetadata {
    /// Creates file metadata for `path`, which must carry the file tag.
    pub fn new(provider: impl Into<String>, path: StoragePath) -> Self {
        debug_assert!(path.is_file(), "file metadata requires a file path");
        Self {
            name: path.name().to_string(),
            path,
            size: None,
            content_type: None,
            modified: None,
            created: None,
            etag: None,
            hashes: BTreeMap::new(),
            provider: provider.into(),
            extra: Map::new(),
        }
    }
}

/// Metadata for a folder entry. Children are fetched separately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderMetadata {
    pub name: String,
    pub path: StoragePath,
    pub provider: String,
    pub extra: Map<String, Value>,
}

impl FolderMetadata {
    /// Creates folder metadata for `path`, which must carry the folder tag.
    pub fn new(provider: impl Into<String>, path: StoragePath) -> Self {
        debug_assert!(path.is_folder(), "folder metadata requires a folder path");
        Self {
            name: path.name().to_string(),
            path,
            provider: provider.into(),
            extra: Map::new(),
        }
    }
}

/// One entry in a file's revision history, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionMetadata {
    /// Provider-assigned version identifier
    pub version: String,
    pub modified: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub extra: Map<String, Value>,
}

/// The tagged metadata variant providers return for file and folder paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metadata {
    File(FileMetadata),
    Folder(FolderMetadata),
}

impl Metadata {
    pub fn name(&self) -> &str {
        match self {
            Metadata::File(f) => &f.name,
            Metadata::Folder(f) => &f.name,
        }
    }

    pub fn path(&self) -> &StoragePath {
        match self {
            Metadata::File(f) => &f.path,
            Metadata::Folder(f) => &f.path,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Metadata::File(f) => &f.provider,
            Metadata::Folder(f) => &f.provider,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Metadata::File(_))
    }

    /// JSON-API resource type discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Metadata::File(_) => "files",
            Metadata::Folder(_) => "folders",
        }
    }

    /// Flat attribute object for the JSON-API `attributes` member.
    pub fn attributes(&self) -> Value {
        match self {
            Metadata::File(f) => serde_json::json!({
                "kind": "file",
                "name": f.name,
                "path": f.path.to_string(),
                "size": f.size,
                "contentType": f.content_type,
                "modified": f.modified.map(|t| t.to_rfc3339()),
                "created": f.created.map(|t| t.to_rfc3339()),
                "etag": f.etag,
                "hashes": f.hashes,
                "provider": f.provider,
                "extra": f.extra,
            }),
            Metadata::Folder(f) => serde_json::json!({
                "kind": "folder",
                "name": f.name,
                "path": f.path.to_string(),
                "provider": f.provider,
                "extra": f.extra,
            }),
        }
    }
}

impl From<FileMetadata> for Metadata {
    fn from(meta: FileMetadata) -> Self {
        Metadata::File(meta)
    }
}

impl From<FolderMetadata> for Metadata {
    fn from(meta: FolderMetadata) -> Self {
        Metadata::Folder(meta)
    }
}

impl RevisionMetadata {
    /// Flat attribute object for revision listings.
    pub fn attributes(&self) -> Value {
        serde_json::json!({
            "version": self.version,
            "modified": self.modified.map(|t| t.to_rfc3339()),
            "author": self.author,
            "extra": self.extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file() -> FileMetadata {
        let path = StoragePath::parse("/docs/report.txt").unwrap();
        let mut meta = FileMetadata::new("memstore", path);
        meta.size = Some(5);
        meta.hashes
            .insert("sha256".to_string(), "2cf24dba".to_string());
        meta
    }

    #[test]
    fn test_kind_matches_path_tag() {
        let meta: Metadata = sample_file().into();
        assert!(meta.is_file());
        assert!(meta.path().is_file());
        assert_eq!(meta.kind(), "files");

        let folder: Metadata =
            FolderMetadata::new("memstore", StoragePath::parse("/docs/").unwrap()).into();
        assert!(!folder.is_file());
        assert_eq!(folder.kind(), "folders");
    }

    #[test]
    fn test_file_attributes_shape() {
        let meta: Metadata = sample_file().into();
        let attrs = meta.attributes();
        assert_eq!(attrs["kind"], "file");
        assert_eq!(attrs["name"], "report.txt");
        assert_eq!(attrs["path"], "/docs/report.txt");
        assert_eq!(attrs["size"], 5);
        assert_eq!(attrs["hashes"]["sha256"], "2cf24dba");
        assert_eq!(attrs["provider"], "memstore");
    }

    #[test]
    fn test_folder_attributes_preserve_trailing_slash() {
        let folder: Metadata =
            FolderMetadata::new("memstore", StoragePath::parse("/docs/sub/").unwrap()).into();
        assert_eq!(folder.attributes()["path"], "/docs/sub/");
    }

    #[test]
    fn test_name_defaults_from_path() {
        let meta = sample_file();
        assert_eq!(meta.name, "report.txt");
    }
}

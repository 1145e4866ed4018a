//! In-memory storage backend
//!
//! A complete reference implementation of the provider contract backed by
//! process memory. Every integration suite in the workspace mounts it; it
//! also demonstrates the full contract surface: per-part ids, revisions on
//! overwrite, native intra copy/move and optional signed download URLs.
//!
//! A [`MemBackend`] outlives requests and holds one tree per resource;
//! [`MemStore`] is the ephemeral per-request adapter bound to a single
//! resource.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use sluice_core::errors::{GatewayError, GatewayResult};
use sluice_core::metadata::{FileMetadata, FolderMetadata, Metadata, RevisionMetadata};
use sluice_core::path::StoragePath;
use sluice_core::provider::{ByteRange, Download, StorageProvider};
use sluice_core::streams::{
    collect, verify_declared_size, BoxStream, HashAlgorithm, MemoryStream,
};

const ROOT_NODE: u64 = 0;

/// One stored version of a file, newest first in [`FileNode::revisions`].
struct Revision {
    version: String,
    content: Bytes,
    hashes: BTreeMap<String, String>,
    modified: DateTime<Utc>,
}

struct FileNode {
    created: DateTime<Utc>,
    /// Newest first; index 0 is the current content.
    revisions: Vec<Revision>,
    next_version: u64,
}

impl FileNode {
    fn current(&self) -> &Revision {
        &self.revisions[0]
    }
}

enum NodeKind {
    Folder,
    File(FileNode),
}

struct Node {
    name: String,
    parent: Option<u64>,
    kind: NodeKind,
    /// Insertion order; this is the provider's natural listing order.
    children: Vec<u64>,
}

impl Node {
    fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder)
    }
}

struct Tree {
    nodes: HashMap<u64, Node>,
    next_id: u64,
}

impl Tree {
    fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_NODE,
            Node {
                name: String::new(),
                parent: None,
                kind: NodeKind::Folder,
                children: Vec::new(),
            },
        );
        Self { nodes, next_id: 1 }
    }

    fn alloc(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn find_child(&self, folder: u64, name: &str) -> Option<u64> {
        self.nodes[&folder]
            .children
            .iter()
            .copied()
            .find(|id| self.nodes[id].name == name)
    }

    /// Resolves a path to a node, enforcing that the leaf kind matches the
    /// path's tag. A kind mismatch is `NotFound`.
    fn resolve(&self, path: &StoragePath) -> GatewayResult<u64> {
        let mut current = ROOT_NODE;
        let parts = path.parts();
        for (index, part) in parts.iter().enumerate() {
            let child = self
                .find_child(current, part.name())
                .ok_or_else(|| GatewayError::NotFound(path.to_string()))?;
            let is_last = index + 1 == parts.len();
            let want_folder = if is_last { path.is_folder() } else { true };
            if self.nodes[&child].is_folder() != want_folder {
                return Err(GatewayError::NotFound(path.to_string()));
            }
            current = child;
        }
        Ok(current)
    }

    /// Resolves the parent folder of a (possibly not yet existing) leaf.
    fn resolve_parent(&self, path: &StoragePath) -> GatewayResult<u64> {
        self.resolve(&path.parent())
    }

    fn detach(&mut self, id: u64) {
        if let Some(parent) = self.nodes[&id].parent {
            if let Some(node) = self.nodes.get_mut(&parent) {
                node.children.retain(|&child| child != id);
            }
        }
    }

    fn remove_subtree(&mut self, id: u64) {
        let children = self.nodes[&id].children.clone();
        for child in children {
            self.remove_subtree(child);
        }
        self.nodes.remove(&id);
    }

    fn clone_subtree(&mut self, source: u64, new_name: &str, new_parent: u64) -> u64 {
        let id = self.alloc();
        let (kind, children) = {
            let node = &self.nodes[&source];
            let kind = match &node.kind {
                NodeKind::Folder => NodeKind::Folder,
                NodeKind::File(file) => NodeKind::File(FileNode {
                    created: Utc::now(),
                    revisions: vec![Revision {
                        version: "1".to_string(),
                        content: file.current().content.clone(),
                        hashes: file.current().hashes.clone(),
                        modified: Utc::now(),
                    }],
                    next_version: 2,
                }),
            };
            (kind, node.children.clone())
        };
        self.nodes.insert(
            id,
            Node {
                name: new_name.to_string(),
                parent: Some(new_parent),
                kind,
                children: Vec::new(),
            },
        );
        self.nodes.get_mut(&new_parent).unwrap().children.push(id);
        for child in children {
            let child_name = self.nodes[&child].name.clone();
            self.clone_subtree(child, &child_name, id);
        }
        id
    }
}

/// Process-lifetime state shared by every [`MemStore`] bound to it.
pub struct MemBackend {
    id: String,
    trees: DashMap<String, Arc<Mutex<Tree>>>,
}

impl MemBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4().to_string(),
            trees: DashMap::new(),
        })
    }

    fn tree(&self, resource: &str) -> Arc<Mutex<Tree>> {
        self.trees
            .entry(resource.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Tree::new())))
            .clone()
    }
}

/// Per-request adapter over a [`MemBackend`] resource tree.
pub struct MemStore {
    provider_name: String,
    resource: String,
    backend: Arc<MemBackend>,
    signed_base: Option<String>,
}

impl MemStore {
    pub fn new(
        provider_name: impl Into<String>,
        resource: impl Into<String>,
        backend: Arc<MemBackend>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            resource: resource.into(),
            backend,
            signed_base: None,
        }
    }

    /// Enables signed download URLs: non-proxied downloads answer with a
    /// redirect under this base instead of a stream.
    pub fn with_signed_base(mut self, base: impl Into<String>) -> Self {
        self.signed_base = Some(base.into());
        self
    }

    fn tree(&self) -> Arc<Mutex<Tree>> {
        self.backend.tree(&self.resource)
    }

    fn file_metadata(&self, tree: &Tree, id: u64, path: &StoragePath, version: Option<&str>) -> GatewayResult<FileMetadata> {
        let node = &tree.nodes[&id];
        let NodeKind::File(file) = &node.kind else {
            return Err(GatewayError::NotFound(path.to_string()));
        };
        let revision = match version {
            None => file.current(),
            Some(version) => file
                .revisions
                .iter()
                .find(|r| r.version == version)
                .ok_or_else(|| {
                    GatewayError::NotFound(format!("{path} has no version {version}"))
                })?,
        };
        let mut meta = FileMetadata::new(
            self.provider_name.clone(),
            path.with_leaf_id(id.to_string()),
        );
        meta.size = Some(revision.content.len() as u64);
        meta.modified = Some(revision.modified);
        meta.created = Some(file.created);
        meta.etag = revision.hashes.get("sha256").cloned();
        meta.hashes = revision.hashes.clone();
        meta.extra
            .insert("version".to_string(), revision.version.clone().into());
        Ok(meta)
    }

    fn folder_metadata(&self, path: &StoragePath, id: u64) -> FolderMetadata {
        FolderMetadata::new(
            self.provider_name.clone(),
            path.with_leaf_id(id.to_string()),
        )
    }
}

#[async_trait]
impl StorageProvider for MemStore {
    fn name(&self) -> &str {
        &self.provider_name
    }

    fn storage_root_id(&self) -> String {
        format!("{}:{}", self.backend.id, self.resource)
    }

    async fn validate_v1_path(&self, raw: &str) -> GatewayResult<StoragePath> {
        let parsed = StoragePath::parse(raw)?;
        let tree = self.tree();
        let tree = tree.lock().unwrap();

        // Re-walk attaching node ids part by part.
        let mut resolved = StoragePath::root();
        let mut current = ROOT_NODE;
        let parts = parsed.parts();
        for (index, part) in parts.iter().enumerate() {
            let child = tree
                .find_child(current, part.name())
                .ok_or_else(|| GatewayError::NotFound(parsed.to_string()))?;
            let is_last = index + 1 == parts.len();
            let want_folder = if is_last { parsed.is_folder() } else { true };
            if tree.nodes[&child].is_folder() != want_folder {
                return Err(GatewayError::NotFound(parsed.to_string()));
            }
            resolved = resolved.child_with_id(part.name(), want_folder, Some(child.to_string()))?;
            current = child;
        }
        Ok(resolved)
    }

    async fn validate_path(&self, raw: &str) -> GatewayResult<StoragePath> {
        StoragePath::parse(raw)
    }

    async fn metadata(&self, path: &StoragePath, version: Option<&str>) -> GatewayResult<Metadata> {
        let tree = self.tree();
        let tree = tree.lock().unwrap();
        let id = tree.resolve(path)?;
        if path.is_folder() {
            Ok(Metadata::Folder(self.folder_metadata(path, id)))
        } else {
            Ok(Metadata::File(self.file_metadata(&tree, id, path, version)?))
        }
    }

    async fn children(&self, path: &StoragePath) -> GatewayResult<Vec<Metadata>> {
        if !path.is_folder() {
            return Err(GatewayError::InvalidPath(format!(
                "cannot list a file: {path}"
            )));
        }
        let tree = self.tree();
        let tree = tree.lock().unwrap();
        let id = tree.resolve(path)?;
        let mut out = Vec::new();
        for &child_id in &tree.nodes[&id].children {
            let child = &tree.nodes[&child_id];
            let child_path = path.child_with_id(
                &child.name,
                child.is_folder(),
                Some(child_id.to_string()),
            )?;
            if child.is_folder() {
                out.push(Metadata::Folder(self.folder_metadata(&child_path, child_id)));
            } else {
                out.push(Metadata::File(self.file_metadata(
                    &tree, child_id, &child_path, None,
                )?));
            }
        }
        Ok(out)
    }

    async fn download(
        &self,
        path: &StoragePath,
        version: Option<&str>,
        range: Option<ByteRange>,
        proxy: bool,
    ) -> GatewayResult<Download> {
        if path.is_folder() {
            return Err(GatewayError::NotFound(path.to_string()));
        }
        if !proxy {
            if let Some(base) = &self.signed_base {
                return Ok(Download::Redirect(format!(
                    "{base}/{}{path}",
                    self.resource
                )));
            }
        }

        let tree = self.tree();
        let tree = tree.lock().unwrap();
        let id = tree.resolve(path)?;
        let NodeKind::File(file) = &tree.nodes[&id].kind else {
            return Err(GatewayError::NotFound(path.to_string()));
        };
        let revision = match version {
            None => file.current(),
            Some(version) => file
                .revisions
                .iter()
                .find(|r| r.version == version)
                .ok_or_else(|| {
                    GatewayError::NotFound(format!("{path} has no version {version}"))
                })?,
        };

        let content = match range {
            None => revision.content.clone(),
            Some(ByteRange { start, end }) => {
                let len = revision.content.len() as u64;
                if start >= len && len > 0 {
                    return Err(GatewayError::InvalidArgument(format!(
                        "range start {start} past end of {len}-byte file"
                    )));
                }
                let end = end.map_or(len, |e| (e + 1).min(len));
                revision.content.slice(start as usize..end as usize)
            }
        };
        Ok(Download::Stream(Box::new(MemoryStream::new(content))))
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
        let declared = stream.size();
        let mut stream = stream;
        let content = collect(stream.as_mut()).await?;
        verify_declared_size(declared, content.len() as u64)?;

        let mut hashes = BTreeMap::new();
        for algorithm in [HashAlgorithm::Sha256, HashAlgorithm::Md5] {
            hashes.insert(algorithm.name().to_string(), algorithm.digest(&content));
        }

        let tree = self.tree();
        let mut tree = tree.lock().unwrap();
        let parent = tree.resolve_parent(path)?;

        let (id, created) = match tree.find_child(parent, path.name()) {
            Some(existing) => {
                let node = tree.nodes.get_mut(&existing).unwrap();
                let NodeKind::File(file) = &mut node.kind else {
                    return Err(GatewayError::NamingConflict {
                        name: path.name().to_string(),
                    });
                };
                let version = file.next_version.to_string();
                file.next_version += 1;
                file.revisions.insert(
                    0,
                    Revision {
                        version,
                        content: Bytes::from(content),
                        hashes: hashes.clone(),
                        modified: Utc::now(),
                    },
                );
                (existing, false)
            }
            None => {
                let id = tree.alloc();
                tree.nodes.insert(
                    id,
                    Node {
                        name: path.name().to_string(),
                        parent: Some(parent),
                        kind: NodeKind::File(FileNode {
                            created: Utc::now(),
                            revisions: vec![Revision {
                                version: "1".to_string(),
                                content: Bytes::from(content),
                                hashes: hashes.clone(),
                                modified: Utc::now(),
                            }],
                            next_version: 2,
                        }),
                        children: Vec::new(),
                    },
                );
                tree.nodes.get_mut(&parent).unwrap().children.push(id);
                (id, true)
            }
        };

        let meta = self.file_metadata(&tree, id, path, None)?;
        Ok((meta, created))
    }

    async fn delete(&self, path: &StoragePath, confirm_delete: bool) -> GatewayResult<()> {
        let tree = self.tree();
        let mut tree = tree.lock().unwrap();
        if path.is_root() {
            if !confirm_delete {
                return Err(GatewayError::InvalidArgument(
                    "deleting the root requires confirm_delete".to_string(),
                ));
            }
            let children = tree.nodes[&ROOT_NODE].children.clone();
            for child in children {
                tree.remove_subtree(child);
            }
            tree.nodes.get_mut(&ROOT_NODE).unwrap().children.clear();
            return Ok(());
        }
        let id = tree.resolve(path)?;
        tree.detach(id);
        tree.remove_subtree(id);
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
        let tree = self.tree();
        let mut tree = tree.lock().unwrap();
        let parent = tree.resolve_parent(path)?;
        if tree.find_child(parent, path.name()).is_some() {
            return Err(GatewayError::NamingConflict {
                name: path.name().to_string(),
            });
        }
        let id = tree.alloc();
        tree.nodes.insert(
            id,
            Node {
                name: path.name().to_string(),
                parent: Some(parent),
                kind: NodeKind::Folder,
                children: Vec::new(),
            },
        );
        tree.nodes.get_mut(&parent).unwrap().children.push(id);
        Ok(self.folder_metadata(path, id))
    }

    async fn revisions(&self, path: &StoragePath) -> GatewayResult<Vec<RevisionMetadata>> {
        let tree = self.tree();
        let tree = tree.lock().unwrap();
        let id = tree.resolve(path)?;
        let NodeKind::File(file) = &tree.nodes[&id].kind else {
            return Err(GatewayError::NotFound(path.to_string()));
        };
        Ok(file
            .revisions
            .iter()
            .map(|revision| RevisionMetadata {
                version: revision.version.clone(),
                modified: Some(revision.modified),
                author: None,
                extra: serde_json::Map::new(),
            })
            .collect())
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
        let tree = self.tree();
        let mut tree = tree.lock().unwrap();
        let src_id = tree.resolve(source)?;
        let dest_parent = tree.resolve_parent(destination)?;
        if let Some(existing) = tree.find_child(dest_parent, destination.name()) {
            tree.detach(existing);
            tree.remove_subtree(existing);
        }
        let new_id = tree.clone_subtree(src_id, destination.name(), dest_parent);
        let meta = if destination.is_folder() {
            Metadata::Folder(self.folder_metadata(destination, new_id))
        } else {
            Metadata::File(self.file_metadata(&tree, new_id, destination, None)?)
        };
        Ok((meta, true))
    }

    async fn intra_move(
        &self,
        _dest: &dyn StorageProvider,
        source: &StoragePath,
        destination: &StoragePath,
    ) -> GatewayResult<(Metadata, bool)> {
        let tree = self.tree();
        let mut tree = tree.lock().unwrap();
        let src_id = tree.resolve(source)?;
        let dest_parent = tree.resolve_parent(destination)?;
        if let Some(existing) = tree.find_child(dest_parent, destination.name()) {
            if existing != src_id {
                tree.detach(existing);
                tree.remove_subtree(existing);
            }
        }
        tree.detach(src_id);
        {
            let node = tree.nodes.get_mut(&src_id).unwrap();
            node.name = destination.name().to_string();
            node.parent = Some(dest_parent);
        }
        tree.nodes
            .get_mut(&dest_parent)
            .unwrap()
            .children
            .push(src_id);
        let meta = if destination.is_folder() {
            Metadata::Folder(self.folder_metadata(destination, src_id))
        } else {
            Metadata::File(self.file_metadata(&tree, src_id, destination, None)?)
        };
        Ok((meta, true))
    }
}

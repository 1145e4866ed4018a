//! Storage path model
//!
//! A [`StoragePath`] is an immutable, ordered sequence of named parts with
//! an explicit file-or-folder tag on the leaf. The tag is part of identity:
//! `/docs/report` (file) and `/docs/report/` (folder) are distinct entries.
//! Each part may carry an opaque backend identifier for providers whose
//! names collide but whose ids do not.
//!
//! The trailing-slash convention is load-bearing everywhere: a raw path
//! ending in `/` is a folder, anything else is a file, and every code path
//! that serialises a [`StoragePath`] preserves the slash.

use std::fmt::{self, Display, Formatter};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{GatewayError, GatewayResult};

/// One named component of a [`StoragePath`].
///
/// `identifier` is the backend's opaque id for this component, when the
/// backend indexes by id rather than (or in addition to) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathPart {
    name: String,
    identifier: Option<String>,
}

impl PathPart {
    fn new(name: impl Into<String>, identifier: Option<String>) -> GatewayResult<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(GatewayError::InvalidPath(
                "path segment cannot be empty".to_string(),
            ));
        }
        if name.contains('/') {
            return Err(GatewayError::InvalidPath(format!(
                "path segment contains separator: {name}"
            )));
        }
        if name == "." || name == ".." {
            return Err(GatewayError::InvalidPath(format!(
                "path segment is not allowed: {name}"
            )));
        }
        Ok(Self { name, identifier })
    }

    /// Human-readable component name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque backend identifier, if the producing adapter attached one.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }
}

/// An ordered, tagged path into a storage backend.
///
/// The empty sequence is the provider root and is always a folder. Two
/// paths are equal iff their part sequences (name + identifier) and their
/// leaf tags are identical.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StoragePath {
    parts: Vec<PathPart>,
    folder: bool,
}

impl StoragePath {
    /// The provider root: empty part sequence, always a folder.
    pub fn root() -> Self {
        Self { parts: Vec::new(), folder: true }
    }

    /// Parses a raw path, inferring the kind from the trailing slash.
    ///
    /// Accepts an optional leading `/`. The empty string and `/` both name
    /// the root. Empty interior segments and `.`/`..` segments are
    /// rejected with [`GatewayError::InvalidPath`].
    pub fn parse(raw: &str) -> GatewayResult<Self> {
        if raw.contains("//") {
            return Err(GatewayError::InvalidPath(format!(
                "path contains an empty segment: {raw}"
            )));
        }
        let folder = raw.is_empty() || raw.ends_with('/');
        let trimmed = raw.strip_prefix('/').unwrap_or(raw);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);

        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let parts = trimmed
            .split('/')
            .map(|segment| PathPart::new(segment, None))
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(Self { parts, folder })
    }

    /// Parses a raw path that must match the expected kind.
    ///
    /// Fails with [`GatewayError::InvalidPath`] when the trailing-slash
    /// convention disagrees with `expect_folder`.
    pub fn parse_expecting(raw: &str, expect_folder: bool) -> GatewayResult<Self> {
        let path = Self::parse(raw)?;
        if path.is_folder() != expect_folder {
            let wanted = if expect_folder { "folder" } else { "file" };
            return Err(GatewayError::InvalidPath(format!(
                "expected a {wanted} path, got {raw:?}"
            )));
        }
        Ok(path)
    }

    /// Builds a path directly from resolved parts.
    ///
    /// Used by adapters that resolve ids while walking the backend tree.
    pub fn from_parts(
        parts: Vec<(String, Option<String>)>,
        folder: bool,
    ) -> GatewayResult<Self> {
        let parts = parts
            .into_iter()
            .map(|(name, id)| PathPart::new(name, id))
            .collect::<GatewayResult<Vec<_>>>()?;
        if parts.is_empty() && !folder {
            return Err(GatewayError::InvalidPath(
                "the root cannot be a file".to_string(),
            ));
        }
        Ok(Self { parts, folder })
    }

    /// True when this path names a folder.
    pub fn is_folder(&self) -> bool {
        self.folder
    }

    /// True when this path names a file.
    pub fn is_file(&self) -> bool {
        !self.folder
    }

    /// True for the provider root.
    pub fn is_root(&self) -> bool {
        self.parts.is_empty()
    }

    /// Leaf name; the root's name is the empty string.
    pub fn name(&self) -> &str {
        self.parts.last().map(|p| p.name()).unwrap_or("")
    }

    /// Leaf identifier, if one was attached.
    pub fn identifier(&self) -> Option<&str> {
        self.parts.last().and_then(|p| p.identifier())
    }

    /// The ordered part sequence, root excluded.
    pub fn parts(&self) -> &[PathPart] {
        &self.parts
    }

    /// Appends a child part. The receiver must be a folder.
    pub fn child(&self, name: &str, folder: bool) -> GatewayResult<Self> {
        self.child_with_id(name, folder, None)
    }

    /// Appends a child part carrying a backend identifier.
    pub fn child_with_id(
        &self,
        name: &str,
        folder: bool,
        identifier: Option<String>,
    ) -> GatewayResult<Self> {
        if !self.folder {
            return Err(GatewayError::InvalidPath(format!(
                "cannot extend a file path: {self}"
            )));
        }
        let mut parts = self.parts.clone();
        parts.push(PathPart::new(name, identifier)?);
        Ok(Self { parts, folder })
    }

    /// Parent folder; the root's parent is the root.
    ///
    /// Ancestor identifiers are preserved.
    pub fn parent(&self) -> Self {
        if self.parts.is_empty() {
            return Self::root();
        }
        let mut parts = self.parts.clone();
        parts.pop();
        Self { parts, folder: true }
    }

    /// Replaces the leaf name while keeping its identifier and tag.
    pub fn rename(&self, new_name: &str) -> GatewayResult<Self> {
        let Some(last) = self.parts.last() else {
            return Err(GatewayError::InvalidPath(
                "the root cannot be renamed".to_string(),
            ));
        };
        let mut parts = self.parts.clone();
        *parts.last_mut().unwrap() = PathPart::new(new_name, last.identifier.clone())?;
        Ok(Self { parts, folder: self.folder })
    }

    /// Returns a copy with the leaf identifier set.
    pub fn with_leaf_id(&self, identifier: impl Into<String>) -> Self {
        let mut path = self.clone();
        if let Some(last) = path.parts.last_mut() {
            last.identifier = Some(identifier.into());
        }
        path
    }

    /// Number of parts (0 for the root).
    pub fn depth(&self) -> usize {
        self.parts.len()
    }
}

impl Display for StoragePath {
    /// Serialises with a leading slash and, for folders, the trailing
    /// slash. The root renders as `/`.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.parts.is_empty() {
            return write!(f, "/");
        }
        for part in &self.parts {
            write!(f, "/{}", part.name())?;
        }
        if self.folder {
            write!(f, "/")?;
        }
        Ok(())
    }
}

impl Serialize for StoragePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StoragePath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

//! Destination naming and conflict resolution
//!
//! Computes the final destination path for uploads, folder creation and
//! copy/move, applying the caller's conflict policy against what already
//! exists at the target.

use std::str::FromStr;

use sluice_core::errors::{GatewayError, GatewayResult};
use sluice_core::metadata::Metadata;
use sluice_core::path::StoragePath;
use sluice_core::provider::StorageProvider;

/// What to do when the destination name is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail with a 409 naming conflict.
    #[default]
    Warn,
    /// Overwrite the existing entity.
    Replace,
    /// Disambiguate with an incrementing " (n)" suffix.
    Keep,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictPolicy::Warn => "warn",
            ConflictPolicy::Replace => "replace",
            ConflictPolicy::Keep => "keep",
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "warn" => Ok(ConflictPolicy::Warn),
            "replace" => Ok(ConflictPolicy::Replace),
            "keep" => Ok(ConflictPolicy::Keep),
            other => Err(GatewayError::InvalidArgument(format!(
                "unknown conflict policy: {other}"
            ))),
        }
    }
}

/// The resolved destination and whatever already lives there.
///
/// `existing` is only populated under [`ConflictPolicy::Replace`]; the
/// other policies never return an occupied path.
pub struct ResolvedDestination {
    pub path: StoragePath,
    pub existing: Option<Metadata>,
}

/// " (n)" suffix insertion: before the extension for files, at the end
/// for folders. Leading-dot names ("\.gitignore") count as extensionless.
pub fn suffixed_name(name: &str, n: u32, folder: bool) -> String {
    if folder {
        return format!("{name} ({n})");
    }
    match name.rfind('.') {
        Some(pos) if pos > 0 => {
            let (stem, ext) = name.split_at(pos);
            format!("{stem} ({n}){ext}")
        }
        _ => format!("{name} ({n})"),
    }
}

/// Resolves the final path for `leaf` under `parent` on the destination
/// provider, honouring `policy`.
///
/// The keep-suffix search is linear and increments from 1; after `cap`
/// occupied candidates it gives up with [`GatewayError::NamingConflict`].
pub async fn resolve_destination(
    dest: &dyn StorageProvider,
    parent: &StoragePath,
    leaf: &str,
    folder: bool,
    policy: ConflictPolicy,
    cap: u32,
) -> GatewayResult<ResolvedDestination> {
    let candidate = dest.revalidate_path(parent, leaf, folder).await?;
    let existing = dest.exists(&candidate).await?;

    match (policy, existing) {
        (_, None) => Ok(ResolvedDestination { path: candidate, existing: None }),
        (ConflictPolicy::Warn, Some(_)) => {
            Err(GatewayError::NamingConflict { name: leaf.to_string() })
        }
        (ConflictPolicy::Replace, Some(meta)) => {
            Ok(ResolvedDestination { path: candidate, existing: Some(meta) })
        }
        (ConflictPolicy::Keep, Some(_)) => {
            for n in 1..=cap {
                let name = suffixed_name(leaf, n, folder);
                let candidate = dest.revalidate_path(parent, &name, folder).await?;
                if dest.exists(&candidate).await?.is_none() {
                    return Ok(ResolvedDestination { path: candidate, existing: None });
                }
            }
            Err(GatewayError::NamingConflict { name: leaf.to_string() })
        }
    }
}

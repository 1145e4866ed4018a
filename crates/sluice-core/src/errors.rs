//! Gateway error taxonomy
//!
//! Every fallible operation in the gateway surfaces one of these variants.
//! Each variant carries a fixed HTTP status and a stable wire code; backend
//! adapters normalise raw backend failures into this taxonomy so the
//! pipeline never leaks upstream status codes to clients.

use thiserror::Error;

/// Result alias used throughout the gateway crates.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors produced by the gateway core, engine, providers and pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed or kind-mismatched raw path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Malformed query parameter or request body
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Caller credentials were missing or rejected by the auth provider
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Valid credentials without permission for the requested action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The entity does not exist, or exists with the other kind
    #[error("Not found: {0}")]
    NotFound(String),

    /// The provider cannot perform this action at all
    #[error("Action not supported: {0}")]
    NotSupported(String),

    /// Destination name already taken and the conflict policy forbids it
    #[error("Cannot complete action: file or folder \"{name}\" already exists")]
    NamingConflict {
        /// The conflicting leaf name
        name: String,
    },

    /// The entity existed but has been permanently removed by the backend
    #[error("Gone: {0}")]
    Gone(String),

    /// Request body exceeds what the provider accepts
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Stream ended before the declared byte count arrived
    #[error("Upload incomplete: expected {expected} bytes, received {received}")]
    UploadIncomplete {
        /// Bytes the stream declared
        expected: u64,
        /// Bytes actually consumed
        received: u64,
    },

    /// Source and destination digests disagree after a streaming transfer
    #[error("Content hash mismatch for {algorithm}: source {source_hash}, destination {destination}")]
    HashMismatch {
        /// Lowercase algorithm name, e.g. "sha256"
        algorithm: String,
        /// Hex digest reported by the source
        source_hash: String,
        /// Hex digest reported by the destination
        destination: String,
    },

    /// Fixed-window limit exhausted for the caller's credential
    #[error("Rate limit exceeded, retry in {retry_after} seconds")]
    RateLimited {
        /// Seconds until the current window ends
        retry_after: u64,
    },

    /// Declared but unimplemented capability (e.g. native copy absent)
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// A dependency the gateway needs (auth provider, counter store) is down
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The backend misbehaved in a way the adapter could not classify
    #[error("Provider error: {0}")]
    Provider(String),

    /// Anything else; logged with full context, returned opaque
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl GatewayError {
    /// The fixed HTTP status for this error kind.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidPath(_) | Self::InvalidArgument(_) | Self::UploadIncomplete { .. } => 400,
            Self::Unauthorized(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::NotSupported(_) => 405,
            Self::NamingConflict { .. } => 409,
            Self::Gone(_) => 410,
            Self::PayloadTooLarge(_) => 413,
            Self::RateLimited { .. } => 429,
            Self::HashMismatch { .. } | Self::Unexpected(_) => 500,
            Self::NotImplemented(_) => 501,
            Self::Provider(_) => 502,
            Self::ServiceUnavailable(_) => 503,
        }
    }

    /// Stable machine-readable code used in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "InvalidPath",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::Unauthorized(_) => "Unauthorized",
            Self::Forbidden(_) => "Forbidden",
            Self::NotFound(_) => "NotFound",
            Self::NotSupported(_) => "NotSupported",
            Self::NamingConflict { .. } => "NamingConflict",
            Self::Gone(_) => "Gone",
            Self::PayloadTooLarge(_) => "PayloadTooLarge",
            Self::UploadIncomplete { .. } => "UploadIncomplete",
            Self::HashMismatch { .. } => "HashMismatch",
            Self::RateLimited { .. } => "RateLimited",
            Self::NotImplemented(_) => "NotImplemented",
            Self::ServiceUnavailable(_) => "ServiceUnavailable",
            Self::Provider(_) => "ProviderError",
            Self::Unexpected(_) => "Unexpected",
        }
    }

    /// Optional provider-neutral context for the error body's `data` field.
    pub fn data(&self) -> Option<serde_json::Value> {
        match self {
            Self::NamingConflict { name } => Some(serde_json::json!({ "conflicting_name": name })),
            Self::RateLimited { retry_after } => {
                Some(serde_json::json!({ "retry_after": retry_after }))
            }
            Self::UploadIncomplete { expected, received } => {
                Some(serde_json::json!({ "expected": expected, "received": received }))
            }
            _ => None,
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::Forbidden(err.to_string()),
            _ => Self::Unexpected(err.to_string()),
        }
    }
}

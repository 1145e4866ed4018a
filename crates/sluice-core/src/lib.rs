//! Core domain model and ports for the sluice storage gateway.
//!
//! This crate holds everything the rest of the workspace builds on:
//! the tagged path model, the metadata schema, the stream primitives,
//! the provider and auth-handler contracts, the error taxonomy and the
//! typed configuration. It has no HTTP server or client of its own.

pub mod auth;
pub mod config;
pub mod errors;
pub mod metadata;
pub mod metrics;
pub mod notify;
pub mod path;
pub mod provider;
pub mod streams;

pub use errors::{GatewayError, GatewayResult};
pub use metadata::{FileMetadata, FolderMetadata, Metadata, RevisionMetadata};
pub use path::StoragePath;
pub use provider::{ByteRange, Download, StorageProvider};

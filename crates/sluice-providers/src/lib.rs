//! Bundled provider adapters for the sluice gateway: an in-memory
//! reference backend, a local-filesystem backend, and the registry the
//! pipeline materialises per-request adapters from.

pub mod localfs;
pub mod memstore;
pub mod registry;

pub use localfs::LocalFs;
pub use memstore::{MemBackend, MemStore};
pub use registry::{LocalFsFactory, MemStoreFactory, ProviderFactory, ProviderRegistry};

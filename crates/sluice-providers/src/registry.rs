//! Provider registry
//!
//! Maps provider names to factories so the pipeline can materialise a
//! per-request adapter from the auth handler's credentials+settings
//! bundle. Registrations are declared once at startup.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use sluice_core::auth::{Credentials, Settings};
use sluice_core::errors::{GatewayError, GatewayResult};
use sluice_core::provider::StorageProvider;

use crate::localfs::LocalFs;
use crate::memstore::{MemBackend, MemStore};

/// Builds one provider instance per request.
pub trait ProviderFactory: Send + Sync {
    fn name(&self) -> &str;

    fn make(
        &self,
        resource: &str,
        credentials: &Credentials,
        settings: &Settings,
    ) -> GatewayResult<Box<dyn StorageProvider>>;
}

/// Name → factory map held by the gateway for its whole lifetime.
#[derive(Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ProviderFactory>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.name().to_string(), factory);
    }

    /// Materialises an adapter; an unknown provider name is `NotFound`.
    pub fn make(
        &self,
        provider: &str,
        resource: &str,
        credentials: &Credentials,
        settings: &Settings,
    ) -> GatewayResult<Box<dyn StorageProvider>> {
        let factory = self
            .factories
            .get(provider)
            .ok_or_else(|| GatewayError::NotFound(format!("unknown provider: {provider}")))?;
        factory.make(resource, credentials, settings)
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

/// Factory for [`MemStore`] adapters over one shared backend.
pub struct MemStoreFactory {
    name: String,
    backend: Arc<MemBackend>,
    signed_base: Option<String>,
}

impl MemStoreFactory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            backend: MemBackend::new(),
            signed_base: None,
        }
    }

    /// Makes every adapter hand out signed download URLs under `base`.
    pub fn with_signed_base(mut self, base: impl Into<String>) -> Self {
        self.signed_base = Some(base.into());
        self
    }
}

impl ProviderFactory for MemStoreFactory {
    fn name(&self) -> &str {
        &self.name
    }

    fn make(
        &self,
        resource: &str,
        _credentials: &Credentials,
        _settings: &Settings,
    ) -> GatewayResult<Box<dyn StorageProvider>> {
        let mut store = MemStore::new(self.name.clone(), resource, Arc::clone(&self.backend));
        if let Some(base) = &self.signed_base {
            store = store.with_signed_base(base.clone());
        }
        Ok(Box::new(store))
    }
}

/// Factory for [`LocalFs`] adapters under a fixed root directory.
///
/// The settings bundle may override the root per grant via a "root" field.
pub struct LocalFsFactory {
    root: PathBuf,
}

impl LocalFsFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ProviderFactory for LocalFsFactory {
    fn name(&self) -> &str {
        crate::localfs::PROVIDER_NAME
    }

    fn make(
        &self,
        resource: &str,
        _credentials: &Credentials,
        settings: &Settings,
    ) -> GatewayResult<Box<dyn StorageProvider>> {
        let root = settings
            .get_str("root")
            .map(PathBuf::from)
            .unwrap_or_else(|| self.root.clone());
        Ok(Box::new(LocalFs::new(root, resource)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_provider_is_not_found() {
        let registry = ProviderRegistry::new();
        let err = registry
            .make("nope", "r1", &Credentials::empty(), &Settings::empty())
            .unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_registered_factory_is_used() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(MemStoreFactory::new("memstore")));
        let provider = registry
            .make("memstore", "r1", &Credentials::empty(), &Settings::empty())
            .unwrap();
        assert_eq!(provider.name(), "memstore");
    }

    #[test]
    fn test_memstore_factory_shares_backend_across_requests() {
        let factory = MemStoreFactory::new("memstore");
        let a = factory
            .make("r1", &Credentials::empty(), &Settings::empty())
            .unwrap();
        let b = factory
            .make("r1", &Credentials::empty(), &Settings::empty())
            .unwrap();
        assert_eq!(a.storage_root_id(), b.storage_root_id());
    }

    #[test]
    fn test_localfs_factory_honours_settings_root() {
        let factory = LocalFsFactory::new("/srv/sluice");
        let settings = Settings::new(serde_json::json!({ "root": "/alt" }));
        let provider = factory
            .make("r1", &Credentials::empty(), &settings)
            .unwrap();
        assert_eq!(provider.storage_root_id(), "/alt/r1");
    }
}

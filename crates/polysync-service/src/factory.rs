//! Provider adapter factory
//!
//! Adapters register a constructor per [`CloudProvider`]; the orchestrator
//! asks the factory for an initialized adapter and never matches on the
//! enum itself. Platform support and credential completeness are checked
//! before anything is constructed.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use polysync_core::domain::errors::SyncError;
use polysync_core::domain::provider::{CloudProvider, Platform, ProviderCredentials};
use polysync_core::ports::provider_adapter::ProviderAdapter;
use polysync_drive::{DriveAdapter, DriveEndpoints};

/// Builds one adapter instance; registered per provider
pub type AdapterConstructor =
    dyn Fn() -> Result<Arc<dyn ProviderAdapter>, SyncError> + Send + Sync;

/// Registry of adapter constructors keyed by provider
pub struct ProviderFactory {
    constructors: DashMap<CloudProvider, Arc<AdapterConstructor>>,
    platform: Platform,
}

impl ProviderFactory {
    /// An empty registry
    pub fn new() -> Self {
        Self::for_platform(Platform::current())
    }

    /// An empty registry validating against an explicit platform
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            constructors: DashMap::new(),
            platform,
        }
    }

    /// A registry with the Drive REST adapter wired for every vendor that
    /// speaks that surface
    pub fn with_defaults() -> Result<Self, SyncError> {
        let factory = Self::new();
        for provider in [
            CloudProvider::GoogleDrive,
            CloudProvider::OneDrive,
            CloudProvider::Dropbox,
        ] {
            let endpoints = DriveEndpoints::for_provider(provider)?;
            factory.register(provider, move || {
                Ok(Arc::new(DriveAdapter::new(provider, endpoints.clone())?)
                    as Arc<dyn ProviderAdapter>)
            });
        }
        Ok(factory)
    }

    /// Registers (or replaces) the constructor for a provider
    pub fn register<F>(&self, provider: CloudProvider, constructor: F)
    where
        F: Fn() -> Result<Arc<dyn ProviderAdapter>, SyncError> + Send + Sync + 'static,
    {
        debug!(provider = %provider, "Registered adapter constructor");
        self.constructors.insert(provider, Arc::new(constructor));
    }

    pub fn is_registered(&self, provider: CloudProvider) -> bool {
        self.constructors.contains_key(&provider)
    }

    /// Providers with a registered constructor, in no particular order
    pub fn registered(&self) -> Vec<CloudProvider> {
        self.constructors.iter().map(|e| *e.key()).collect()
    }

    /// Validates platform and credentials, then builds and initializes an
    /// adapter
    pub async fn create(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<Arc<dyn ProviderAdapter>, SyncError> {
        let provider = credentials.provider();

        if !provider.supports_platform(self.platform) {
            return Err(SyncError::Configuration(format!(
                "{} is not supported on {:?}",
                provider, self.platform
            )));
        }
        let missing = credentials.missing_fields();
        if !missing.is_empty() {
            return Err(SyncError::Configuration(format!(
                "{} credentials missing: {}",
                provider,
                missing.join(", ")
            )));
        }

        let constructor = self
            .constructors
            .get(&provider)
            .ok_or_else(|| {
                SyncError::Configuration(format!("no adapter registered for {}", provider))
            })?
            .clone();

        let adapter = constructor()?;
        adapter.initialize(credentials.clone()).await?;
        info!(provider = %provider, "Adapter created and initialized");
        Ok(adapter)
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polysync_core::ports::memory::MemoryAdapter;

    fn credentials(provider: CloudProvider) -> ProviderCredentials {
        ProviderCredentials::new(provider)
            .with_field("access_token", "tok")
            .with_field("refresh_token", "refresh")
    }

    #[tokio::test]
    async fn test_create_rejects_unsupported_platform() {
        let factory = ProviderFactory::for_platform(Platform::Linux);
        factory.register(CloudProvider::ICloud, || {
            Ok(Arc::new(MemoryAdapter::new(CloudProvider::ICloud)) as Arc<dyn ProviderAdapter>)
        });

        let err = factory
            .create(&ProviderCredentials::new(CloudProvider::ICloud))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_incomplete_credentials() {
        let factory = ProviderFactory::for_platform(Platform::Linux);
        factory.register(CloudProvider::GoogleDrive, || {
            Ok(Arc::new(MemoryAdapter::new(CloudProvider::GoogleDrive))
                as Arc<dyn ProviderAdapter>)
        });

        let bare = ProviderCredentials::new(CloudProvider::GoogleDrive);
        let err = factory.create(&bare).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[tokio::test]
    async fn test_create_initializes_registered_adapter() {
        let factory = ProviderFactory::for_platform(Platform::Linux);
        factory.register(CloudProvider::Dropbox, || {
            Ok(Arc::new(MemoryAdapter::new(CloudProvider::Dropbox)) as Arc<dyn ProviderAdapter>)
        });

        let adapter = factory
            .create(&credentials(CloudProvider::Dropbox))
            .await
            .unwrap();
        assert_eq!(adapter.provider(), CloudProvider::Dropbox);
    }

    #[tokio::test]
    async fn test_unregistered_provider_is_configuration_error() {
        let factory = ProviderFactory::for_platform(Platform::Linux);
        let err = factory
            .create(&credentials(CloudProvider::OneDrive))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no adapter registered"));
    }

    #[test]
    fn test_defaults_cover_rest_vendors() {
        let factory = ProviderFactory::with_defaults().unwrap();
        assert!(factory.is_registered(CloudProvider::GoogleDrive));
        assert!(factory.is_registered(CloudProvider::OneDrive));
        assert!(factory.is_registered(CloudProvider::Dropbox));
        assert!(!factory.is_registered(CloudProvider::ICloud));
    }
}

//! Cloud provider identity and platform metadata
//!
//! [`CloudProvider`] is a closed value enum: it identifies a vendor, carries
//! the platform-support predicate and the credential fields the vendor
//! requires, and nothing else. Concrete behavior lives behind the
//! `ProviderAdapter` port; adding a vendor means adding a variant here and
//! registering an adapter constructor with the factory.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A platform the engine can run on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Android,
    Ios,
    Web,
}

impl Platform {
    /// Returns the platform the engine was compiled for
    pub fn current() -> Self {
        #[cfg(target_os = "android")]
        return Platform::Android;
        #[cfg(target_os = "ios")]
        return Platform::Ios;
        #[cfg(target_os = "macos")]
        return Platform::MacOs;
        #[cfg(target_os = "windows")]
        return Platform::Windows;
        #[cfg(target_arch = "wasm32")]
        return Platform::Web;
        #[cfg(not(any(
            target_os = "android",
            target_os = "ios",
            target_os = "macos",
            target_os = "windows",
            target_arch = "wasm32"
        )))]
        Platform::Linux
    }
}

/// Identity of a supported cloud storage vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloudProvider {
    GoogleDrive,
    ICloud,
    OneDrive,
    Dropbox,
}

impl CloudProvider {
    /// All known providers, in display order
    pub const ALL: [CloudProvider; 4] = [
        CloudProvider::GoogleDrive,
        CloudProvider::ICloud,
        CloudProvider::OneDrive,
        CloudProvider::Dropbox,
    ];

    /// Human-readable vendor name
    pub fn display_name(&self) -> &'static str {
        match self {
            CloudProvider::GoogleDrive => "Google Drive",
            CloudProvider::ICloud => "iCloud",
            CloudProvider::OneDrive => "OneDrive",
            CloudProvider::Dropbox => "Dropbox",
        }
    }

    /// Returns true if this vendor is usable on the given platform
    ///
    /// iCloud requires Apple platforms. Everything else is available
    /// everywhere the engine runs.
    pub fn supports_platform(&self, platform: Platform) -> bool {
        match self {
            CloudProvider::ICloud => matches!(platform, Platform::MacOs | Platform::Ios),
            _ => true,
        }
    }

    /// Credential fields this vendor requires before an adapter can be built
    pub fn required_credentials(&self) -> &'static [&'static str] {
        match self {
            CloudProvider::GoogleDrive | CloudProvider::OneDrive => {
                &["access_token", "refresh_token"]
            }
            CloudProvider::Dropbox => &["access_token"],
            CloudProvider::ICloud => &["container_id"],
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Stored credentials used to construct and initialize a provider adapter
///
/// The shape is a flat map of named secrets plus the token expiry, because
/// each vendor requires a different field set (see
/// [`CloudProvider::required_credentials`]). Secrets never appear in Debug
/// output or logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderCredentials {
    provider: CloudProvider,
    fields: HashMap<String, String>,
    /// When the access token expires, if the vendor uses expiring tokens
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl ProviderCredentials {
    pub fn new(provider: CloudProvider) -> Self {
        Self {
            provider,
            fields: HashMap::new(),
            expires_at: None,
        }
    }

    pub fn provider(&self) -> CloudProvider {
        self.provider
    }

    /// Adds a credential field (builder style)
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_expiry(mut self, expires_at: chrono::DateTime<chrono::Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Returns the names of required fields that are missing or empty
    pub fn missing_fields(&self) -> Vec<&'static str> {
        self.provider
            .required_credentials()
            .iter()
            .filter(|&&key| self.get(key).map_or(true, str::is_empty))
            .copied()
            .collect()
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("provider", &self.provider)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

//! Cloud provider port (driven/secondary port)
//!
//! The uniform contract every vendor adapter satisfies. Adding a vendor
//! means implementing this trait and registering a constructor with the
//! provider factory; nothing above this boundary changes.
//!
//! ## Design notes
//!
//! - Expected failure modes (missing file, nothing to delete) are
//!   `Ok(None)` / `Ok(false)`, not errors. Typed [`SyncError`]s carry the
//!   failure classification the retry layer needs.
//! - Using an adapter before [`ProviderAdapter::initialize`] is a
//!   programmer error and surfaces as `SyncError::Configuration`.
//! - Range transfer primitives (`upload_range`, `download_range`) back the
//!   delta engine's chunk-level transfers. Adapters that cannot serve
//!   ranges return `SyncError::Provider`, and the engine falls back to
//!   full-file transfer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::domain::chunk::ChangeType;
use crate::domain::errors::SyncError;
use crate::domain::provider::{CloudProvider, ProviderCredentials};
use crate::domain::version::FileVersion;

/// Metadata for one remote file or directory
///
/// Port-level DTO; components map it into [`FileVersion`] snapshots where
/// comparison is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Provider-specific identifier
    pub id: String,
    /// Path relative to the sync root, with a leading slash
    pub path: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub checksum: Option<String>,
    pub mime_type: Option<String>,
    pub is_directory: bool,
}

impl RemoteEntry {
    /// Converts this entry into a version snapshot
    pub fn to_version(&self) -> FileVersion {
        let version = FileVersion::new(&self.path, self.size, self.modified_at);
        let version = match &self.checksum {
            Some(c) => version.with_checksum(c.clone()),
            None => version,
        };
        match &self.mime_type {
            Some(m) => version.with_mime_type(m.clone()),
            None => version,
        }
    }
}

/// One entry from a provider change feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteChange {
    pub path: String,
    pub change_type: ChangeType,
    pub entry: Option<RemoteEntry>,
    pub changed_at: DateTime<Utc>,
}

/// Storage quota snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageQuota {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl StorageQuota {
    pub fn available_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.used_bytes)
    }
}

/// Adapter-level tunables readable and writable at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Files above this many bytes use a resumable upload session
    pub simple_upload_threshold: u64,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// Root directory on the remote side
    pub remote_root: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            simple_upload_threshold: 4 * 1024 * 1024,
            request_timeout_secs: 30,
            remote_root: "/".to_string(),
        }
    }
}

/// Uniform capability surface for one cloud storage vendor
///
/// All methods assume `initialize` has been called with valid credentials;
/// token-based adapters transparently refresh expired access tokens before
/// any authenticated call.
#[async_trait::async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The vendor this adapter talks to
    fn provider(&self) -> CloudProvider;

    /// Stores credentials and prepares the adapter for use
    async fn initialize(&self, credentials: ProviderCredentials) -> Result<(), SyncError>;

    /// Establishes (or verifies) the connection; returns false when the
    /// provider rejected the stored credentials
    async fn connect(&self) -> Result<bool, SyncError>;

    /// Tears down the connection and clears session state
    async fn disconnect(&self) -> Result<(), SyncError>;

    /// Returns true while a connect has succeeded and not been torn down
    async fn is_connected(&self) -> bool;

    /// Uploads a local file to the remote path, choosing simple vs
    /// resumable session upload by size
    async fn upload_file(&self, local: &Path, remote: &str) -> Result<RemoteEntry, SyncError>;

    /// Downloads a remote file to the local path
    async fn download_file(&self, remote: &str, local: &Path) -> Result<(), SyncError>;

    /// Uploads one byte range of an existing remote file
    ///
    /// `total_size` is the final size of the file after all ranges land.
    async fn upload_range(
        &self,
        remote: &str,
        offset: u64,
        data: &[u8],
        total_size: u64,
    ) -> Result<(), SyncError>;

    /// Downloads one byte range of a remote file
    async fn download_range(
        &self,
        remote: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, SyncError>;

    /// Deletes a remote file; `Ok(false)` when it was already absent
    async fn delete_file(&self, remote: &str) -> Result<bool, SyncError>;

    /// Returns true if the remote file exists
    async fn file_exists(&self, remote: &str) -> Result<bool, SyncError>;

    /// Fetches metadata; `Ok(None)` when the file is absent
    async fn get_metadata(&self, remote: &str) -> Result<Option<RemoteEntry>, SyncError>;

    /// Lists entries under a directory (`None` = remote root)
    async fn list_files(
        &self,
        dir: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<RemoteEntry>, SyncError>;

    /// Returns the account's storage quota
    async fn get_storage_quota(&self) -> Result<StorageQuota, SyncError>;

    /// Modification time of a remote file; `Ok(None)` when absent
    async fn get_modification_time(
        &self,
        remote: &str,
    ) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.get_metadata(remote).await?.map(|e| e.modified_at))
    }

    /// Size of a remote file; `Ok(None)` when absent
    async fn get_file_size(&self, remote: &str) -> Result<Option<u64>, SyncError> {
        Ok(self.get_metadata(remote).await?.map(|e| e.size))
    }

    /// Creates a remote directory (parents included); idempotent
    async fn create_directory(&self, remote: &str) -> Result<(), SyncError>;

    /// Deletes a remote directory and its contents; `Ok(false)` when absent
    async fn delete_directory(&self, remote: &str) -> Result<bool, SyncError>;

    /// Moves/renames a remote file
    async fn move_file(&self, from: &str, to: &str) -> Result<RemoteEntry, SyncError>;

    /// Copies a remote file
    async fn copy_file(&self, from: &str, to: &str) -> Result<RemoteEntry, SyncError>;

    /// Returns a shareable link for a remote file, when the vendor
    /// supports links
    async fn get_shareable_link(&self, remote: &str) -> Result<Option<String>, SyncError>;

    /// Lists remote changes since a timestamp, optionally scoped to a
    /// directory
    async fn get_remote_changes(
        &self,
        since: Option<DateTime<Utc>>,
        dir: Option<&str>,
    ) -> Result<Vec<RemoteChange>, SyncError>;

    /// Current adapter configuration
    async fn get_configuration(&self) -> ProviderConfig;

    /// Replaces the adapter configuration
    async fn update_configuration(&self, config: ProviderConfig) -> Result<(), SyncError>;

    /// Performs a cheap authenticated round trip; returns false on any
    /// failure instead of erroring
    async fn test_connection(&self) -> bool;

    /// The last error the adapter recorded, for diagnostics
    async fn last_error(&self) -> Option<String>;
}

impl std::fmt::Debug for dyn ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("provider", &self.provider())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_available() {
        let quota = StorageQuota {
            used_bytes: 30,
            total_bytes: 100,
        };
        assert_eq!(quota.available_bytes(), 70);

        let over = StorageQuota {
            used_bytes: 120,
            total_bytes: 100,
        };
        assert_eq!(over.available_bytes(), 0);
    }

    #[test]
    fn test_entry_to_version() {
        let entry = RemoteEntry {
            id: "abc".to_string(),
            path: "/docs/a.txt".to_string(),
            size: 42,
            modified_at: Utc::now(),
            checksum: Some("cafe".to_string()),
            mime_type: Some("text/plain".to_string()),
            is_directory: false,
        };
        let version = entry.to_version();
        assert!(version.exists());
        assert_eq!(version.size(), 42);
        assert_eq!(version.checksum(), Some("cafe"));
        assert_eq!(version.mime_type(), Some("text/plain"));
    }

    #[test]
    fn test_provider_config_defaults() {
        let config = ProviderConfig::default();
        assert_eq!(config.simple_upload_threshold, 4 * 1024 * 1024);
        assert_eq!(config.remote_root, "/");
    }
}

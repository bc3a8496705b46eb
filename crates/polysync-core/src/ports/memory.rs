//! In-memory provider adapter for tests
//!
//! Available behind the `test-util` feature. Stores files in a map,
//! supports range transfers, and can inject failures for retry and
//! circuit-breaker tests.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use crate::domain::chunk::ChangeType;
use crate::domain::errors::SyncError;
use crate::domain::provider::{CloudProvider, ProviderCredentials};
use crate::ports::provider_adapter::{
    ProviderAdapter, ProviderConfig, RemoteChange, RemoteEntry, StorageQuota,
};

#[derive(Debug, Clone)]
struct StoredFile {
    data: Vec<u8>,
    modified_at: DateTime<Utc>,
    checksum: Option<String>,
    mime_type: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    files: HashMap<String, StoredFile>,
    directories: Vec<String>,
    connected: bool,
    initialized: bool,
    config: ProviderConfig,
    last_error: Option<String>,
    /// Errors to inject, popped once per fallible call
    fail_queue: Vec<SyncError>,
    /// Change feed entries returned by get_remote_changes
    changes: Vec<RemoteChange>,
    /// Artificial delay applied to whole-file transfers
    transfer_delay: Option<std::time::Duration>,
}

/// Map-backed [`ProviderAdapter`] for tests
pub struct MemoryAdapter {
    provider: CloudProvider,
    state: Mutex<MemoryState>,
}

impl MemoryAdapter {
    pub fn new(provider: CloudProvider) -> Self {
        Self {
            provider,
            state: Mutex::new(MemoryState {
                config: ProviderConfig::default(),
                ..MemoryState::default()
            }),
        }
    }

    /// A connected, initialized adapter, ready for use
    pub fn connected(provider: CloudProvider) -> Self {
        let adapter = Self::new(provider);
        {
            let mut state = adapter.state.lock().unwrap();
            state.initialized = true;
            state.connected = true;
        }
        adapter
    }

    /// Seeds a remote file
    pub fn put_file(&self, remote: &str, data: Vec<u8>, checksum: Option<String>) {
        let mut state = self.state.lock().unwrap();
        state.files.insert(
            remote.to_string(),
            StoredFile {
                data,
                modified_at: Utc::now(),
                checksum,
                mime_type: None,
            },
        );
    }

    /// Returns the bytes stored for a remote path
    pub fn file_data(&self, remote: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .files
            .get(remote)
            .map(|f| f.data.clone())
    }

    /// Queues errors; each fallible call pops one until the queue drains
    pub fn inject_failures(&self, errors: Vec<SyncError>) {
        self.state.lock().unwrap().fail_queue = errors;
    }

    /// Seeds the change feed
    pub fn set_remote_changes(&self, changes: Vec<RemoteChange>) {
        self.state.lock().unwrap().changes = changes;
    }

    /// Slows whole-file transfers, for tests that need an operation to
    /// stay in flight
    pub fn set_transfer_delay(&self, delay: std::time::Duration) {
        self.state.lock().unwrap().transfer_delay = Some(delay);
    }

    async fn apply_delay(&self) {
        let delay = self.state.lock().unwrap().transfer_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn check_fail(&self) -> Result<(), SyncError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_queue.is_empty() {
            Ok(())
        } else {
            let err = state.fail_queue.remove(0);
            state.last_error = Some(err.to_string());
            Err(err)
        }
    }

    fn require_ready(&self) -> Result<(), SyncError> {
        let state = self.state.lock().unwrap();
        if !state.initialized {
            return Err(SyncError::Configuration(
                "adapter used before initialize".to_string(),
            ));
        }
        Ok(())
    }

    fn entry_for(remote: &str, file: &StoredFile) -> RemoteEntry {
        RemoteEntry {
            id: format!("mem-{}", remote),
            path: remote.to_string(),
            size: file.data.len() as u64,
            modified_at: file.modified_at,
            checksum: file.checksum.clone(),
            mime_type: file.mime_type.clone(),
            is_directory: false,
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for MemoryAdapter {
    fn provider(&self) -> CloudProvider {
        self.provider
    }

    async fn initialize(&self, _credentials: ProviderCredentials) -> Result<(), SyncError> {
        self.state.lock().unwrap().initialized = true;
        Ok(())
    }

    async fn connect(&self) -> Result<bool, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        self.state.lock().unwrap().connected = true;
        Ok(true)
    }

    async fn disconnect(&self) -> Result<(), SyncError> {
        self.state.lock().unwrap().connected = false;
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.state.lock().unwrap().connected
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<RemoteEntry, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        self.apply_delay().await;
        let data = tokio::fs::read(local)
            .await
            .map_err(|e| SyncError::Io(format!("cannot read {}: {}", local.display(), e)))?;
        self.put_file(remote, data, None);
        let state = self.state.lock().unwrap();
        Ok(Self::entry_for(remote, state.files.get(remote).unwrap()))
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<(), SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        self.apply_delay().await;
        let data = self
            .file_data(remote)
            .ok_or_else(|| SyncError::Provider(format!("{} not found", remote)))?;
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Io(e.to_string()))?;
        }
        tokio::fs::write(local, data)
            .await
            .map_err(|e| SyncError::Io(e.to_string()))?;
        Ok(())
    }

    async fn upload_range(
        &self,
        remote: &str,
        offset: u64,
        data: &[u8],
        total_size: u64,
    ) -> Result<(), SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let mut state = self.state.lock().unwrap();
        let file = state.files.entry(remote.to_string()).or_insert(StoredFile {
            data: Vec::new(),
            modified_at: Utc::now(),
            checksum: None,
            mime_type: None,
        });
        file.data.resize(total_size as usize, 0);
        let start = offset as usize;
        file.data[start..start + data.len()].copy_from_slice(data);
        file.modified_at = Utc::now();
        file.checksum = None;
        Ok(())
    }

    async fn download_range(
        &self,
        remote: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let state = self.state.lock().unwrap();
        let file = state
            .files
            .get(remote)
            .ok_or_else(|| SyncError::Provider(format!("{} not found", remote)))?;
        let start = (offset as usize).min(file.data.len());
        let end = ((offset + length) as usize).min(file.data.len());
        Ok(file.data[start..end].to_vec())
    }

    async fn delete_file(&self, remote: &str) -> Result<bool, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        Ok(self.state.lock().unwrap().files.remove(remote).is_some())
    }

    async fn file_exists(&self, remote: &str) -> Result<bool, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        Ok(self.state.lock().unwrap().files.contains_key(remote))
    }

    async fn get_metadata(&self, remote: &str) -> Result<Option<RemoteEntry>, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .get(remote)
            .map(|f| Self::entry_for(remote, f)))
    }

    async fn list_files(
        &self,
        dir: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<RemoteEntry>, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let prefix = dir.unwrap_or("/");
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .filter(|(path, _)| {
                if !path.starts_with(prefix) {
                    return false;
                }
                if recursive {
                    return true;
                }
                // Non-recursive: no further slash past the prefix
                !path[prefix.len()..].trim_start_matches('/').contains('/')
            })
            .map(|(path, file)| Self::entry_for(path, file))
            .collect())
    }

    async fn get_storage_quota(&self) -> Result<StorageQuota, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let used: u64 = self
            .state
            .lock()
            .unwrap()
            .files
            .values()
            .map(|f| f.data.len() as u64)
            .sum();
        Ok(StorageQuota {
            used_bytes: used,
            total_bytes: 1024 * 1024 * 1024,
        })
    }

    async fn create_directory(&self, remote: &str) -> Result<(), SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let mut state = self.state.lock().unwrap();
        if !state.directories.iter().any(|d| d == remote) {
            state.directories.push(remote.to_string());
        }
        Ok(())
    }

    async fn delete_directory(&self, remote: &str) -> Result<bool, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let mut state = self.state.lock().unwrap();
        let existed = state.directories.iter().any(|d| d == remote);
        state.directories.retain(|d| d != remote);
        state
            .files
            .retain(|path, _| !path.starts_with(&format!("{}/", remote)));
        Ok(existed)
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<RemoteEntry, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let mut state = self.state.lock().unwrap();
        let file = state
            .files
            .remove(from)
            .ok_or_else(|| SyncError::Provider(format!("{} not found", from)))?;
        let entry = Self::entry_for(to, &file);
        state.files.insert(to.to_string(), file);
        Ok(entry)
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<RemoteEntry, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let mut state = self.state.lock().unwrap();
        let file = state
            .files
            .get(from)
            .cloned()
            .ok_or_else(|| SyncError::Provider(format!("{} not found", from)))?;
        let entry = Self::entry_for(to, &file);
        state.files.insert(to.to_string(), file);
        Ok(entry)
    }

    async fn get_shareable_link(&self, remote: &str) -> Result<Option<String>, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .contains_key(remote)
            .then(|| format!("https://share.example{}", remote)))
    }

    async fn get_remote_changes(
        &self,
        since: Option<DateTime<Utc>>,
        dir: Option<&str>,
    ) -> Result<Vec<RemoteChange>, SyncError> {
        self.require_ready()?;
        self.check_fail()?;
        let state = self.state.lock().unwrap();
        Ok(state
            .changes
            .iter()
            .filter(|c| since.map_or(true, |s| c.changed_at > s))
            .filter(|c| dir.map_or(true, |d| c.path.starts_with(d)))
            .cloned()
            .collect())
    }

    async fn get_configuration(&self) -> ProviderConfig {
        self.state.lock().unwrap().config.clone()
    }

    async fn update_configuration(&self, config: ProviderConfig) -> Result<(), SyncError> {
        self.state.lock().unwrap().config = config;
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        self.check_fail().is_ok() && self.is_connected().await
    }

    async fn last_error(&self) -> Option<String> {
        self.state.lock().unwrap().last_error.clone()
    }
}

/// Convenience for building change-feed entries in tests
pub fn change_entry(path: &str, change_type: ChangeType) -> RemoteChange {
    RemoteChange {
        path: path.to_string(),
        change_type,
        entry: None,
        changed_at: Utc::now(),
    }
}

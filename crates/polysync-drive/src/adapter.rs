//! The [`ProviderAdapter`] implementation over the Drive REST surface
//!
//! Holds session state behind `tokio::sync::Mutex` because every port
//! method takes `&self`. Expected absences (404) map to `Ok(None)` /
//! `Ok(false)`; every other failure is remembered in `last_error` for
//! diagnostics before propagating.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use polysync_core::domain::errors::SyncError;
use polysync_core::domain::provider::{CloudProvider, ProviderCredentials};
use polysync_core::ports::provider_adapter::{
    ProviderAdapter, ProviderConfig, RemoteChange, RemoteEntry, StorageQuota,
};

use crate::auth::TokenManager;
use crate::client::DriveClient;
use crate::upload;
use crate::wire::{
    ChangesDto, EntryDto, LinkDto, ListDto, MkdirRequest, QuotaDto, TransferRequest,
};

/// Where one vendor's API lives
///
/// Separating the endpoints from the adapter lets tests point the adapter
/// at a local mock server.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub api_base: Url,
    pub token_url: Url,
    pub client_id: Option<String>,
}

impl DriveEndpoints {
    pub fn new(api_base: Url, token_url: Url) -> Self {
        Self {
            api_base,
            token_url,
            client_id: None,
        }
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Production endpoints for the vendors that speak this surface
    pub fn for_provider(provider: CloudProvider) -> Result<Self, SyncError> {
        let (api, token) = match provider {
            CloudProvider::GoogleDrive => (
                "https://drive.polysync.dev/google/v1/",
                "https://oauth2.googleapis.com/token",
            ),
            CloudProvider::OneDrive => (
                "https://drive.polysync.dev/onedrive/v1/",
                "https://login.microsoftonline.com/common/oauth2/v2.0/token",
            ),
            CloudProvider::Dropbox => (
                "https://drive.polysync.dev/dropbox/v1/",
                "https://api.dropbox.com/oauth2/token",
            ),
            CloudProvider::ICloud => {
                return Err(SyncError::Configuration(
                    "iCloud does not expose a REST surface".to_string(),
                ))
            }
        };
        let api_base = Url::parse(api)
            .map_err(|e| SyncError::Configuration(format!("bad api base: {e}")))?;
        let token_url = Url::parse(token)
            .map_err(|e| SyncError::Configuration(format!("bad token url: {e}")))?;
        Ok(Self::new(api_base, token_url))
    }
}

/// Drive REST implementation of the provider port
pub struct DriveAdapter {
    provider: CloudProvider,
    endpoints: DriveEndpoints,
    http: reqwest::Client,
    client: Mutex<Option<Arc<DriveClient>>>,
    config: Mutex<ProviderConfig>,
    connected: AtomicBool,
    last_error: Mutex<Option<String>>,
}

impl DriveAdapter {
    pub fn new(provider: CloudProvider, endpoints: DriveEndpoints) -> Result<Self, SyncError> {
        Self::with_config(provider, endpoints, ProviderConfig::default())
    }

    pub fn with_config(
        provider: CloudProvider,
        endpoints: DriveEndpoints,
        config: ProviderConfig,
    ) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Configuration(format!("http client: {e}")))?;
        Ok(Self {
            provider,
            endpoints,
            http,
            client: Mutex::new(None),
            config: Mutex::new(config),
            connected: AtomicBool::new(false),
            last_error: Mutex::new(None),
        })
    }

    /// The initialized client, or a configuration error
    async fn client(&self) -> Result<Arc<DriveClient>, SyncError> {
        self.client
            .lock()
            .await
            .clone()
            .ok_or_else(|| SyncError::Configuration("adapter not initialized".to_string()))
    }

    /// Records failures for `last_error` before propagating them
    async fn remember<T>(&self, result: Result<T, SyncError>) -> Result<T, SyncError> {
        if let Err(e) = &result {
            *self.last_error.lock().await = Some(e.to_string());
        }
        result
    }

    async fn fetch_metadata(&self, remote: &str) -> Result<Option<RemoteEntry>, SyncError> {
        let client = self.client().await?;
        let url = client.endpoint("metadata", &[("path", remote)])?;
        let response = client.send(|http| http.get(url.clone())).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = DriveClient::expect_success(response).await?;
        let dto: EntryDto = response
            .json()
            .await
            .map_err(|e| SyncError::Provider(format!("bad metadata response: {e}")))?;
        Ok(Some(dto.into_entry()))
    }

    async fn fetch_entry_via(
        &self,
        endpoint: &str,
        from: &str,
        to: &str,
    ) -> Result<RemoteEntry, SyncError> {
        let client = self.client().await?;
        let url = client.endpoint(endpoint, &[])?;
        let body = TransferRequest { from, to };
        let response = client.send(|http| http.post(url.clone()).json(&body)).await?;
        let response = DriveClient::expect_success(response).await?;
        let dto: EntryDto = response
            .json()
            .await
            .map_err(|e| SyncError::Provider(format!("bad {endpoint} response: {e}")))?;
        Ok(dto.into_entry())
    }

    /// DELETE against one endpoint, mapping 404 to "already absent"
    async fn delete_at(&self, endpoint: &str, remote: &str) -> Result<bool, SyncError> {
        let client = self.client().await?;
        let url = client.endpoint(endpoint, &[("path", remote)])?;
        let response = client.send(|http| http.delete(url.clone())).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        DriveClient::expect_success(response).await?;
        Ok(true)
    }

    async fn ping(&self) -> Result<(), SyncError> {
        let client = self.client().await?;
        let url = client.endpoint("ping", &[])?;
        let response = client.send(|http| http.get(url.clone())).await?;
        DriveClient::expect_success(response).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for DriveAdapter {
    fn provider(&self) -> CloudProvider {
        self.provider
    }

    async fn initialize(&self, credentials: ProviderCredentials) -> Result<(), SyncError> {
        if credentials.provider() != self.provider {
            return Err(SyncError::Configuration(format!(
                "credentials are for {}, adapter is for {}",
                credentials.provider(),
                self.provider
            )));
        }
        let missing = credentials.missing_fields();
        if !missing.is_empty() {
            return Err(SyncError::Configuration(format!(
                "missing credential fields: {}",
                missing.join(", ")
            )));
        }
        let mut manager = TokenManager::new(
            self.endpoints.token_url.clone(),
            &credentials,
            self.http.clone(),
        )?;
        if let Some(client_id) = &self.endpoints.client_id {
            manager = manager.with_client_id(client_id.clone());
        }
        let client = DriveClient::new(
            self.endpoints.api_base.clone(),
            Arc::new(manager),
            self.http.clone(),
        );
        *self.client.lock().await = Some(Arc::new(client));
        info!(provider = %self.provider, "Adapter initialized");
        Ok(())
    }

    async fn connect(&self) -> Result<bool, SyncError> {
        match self.ping().await {
            Ok(()) => {
                self.connected.store(true, Ordering::SeqCst);
                info!(provider = %self.provider, "Connected");
                Ok(true)
            }
            Err(SyncError::Authentication(reason)) => {
                warn!(provider = %self.provider, %reason, "Credentials rejected");
                *self.last_error.lock().await = Some(reason);
                Ok(false)
            }
            Err(e) => self.remember(Err(e)).await,
        }
    }

    async fn disconnect(&self) -> Result<(), SyncError> {
        self.connected.store(false, Ordering::SeqCst);
        *self.last_error.lock().await = None;
        debug!(provider = %self.provider, "Disconnected");
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn upload_file(&self, local: &Path, remote: &str) -> Result<RemoteEntry, SyncError> {
        let threshold = self.config.lock().await.simple_upload_threshold;
        let result = async {
            let client = self.client().await?;
            upload::upload_file(&client, local, remote, threshold).await
        }
        .await;
        self.remember(result).await
    }

    async fn download_file(&self, remote: &str, local: &Path) -> Result<(), SyncError> {
        let result = async {
            let client = self.client().await?;
            let url = client.endpoint("content", &[("path", remote)])?;
            let response = client.send(|http| http.get(url.clone())).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(SyncError::Provider(format!("remote file absent: {remote}")));
            }
            let response = DriveClient::expect_success(response).await?;
            let bytes = response
                .bytes()
                .await
                .map_err(crate::client::map_transport)?;
            if let Some(parent) = local.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SyncError::Io(format!("mkdir {}: {e}", parent.display())))?;
            }
            tokio::fs::write(local, &bytes)
                .await
                .map_err(|e| SyncError::Io(format!("write {}: {e}", local.display())))?;
            debug!(remote, bytes = bytes.len(), "Downloaded file");
            Ok(())
        }
        .await;
        self.remember(result).await
    }

    async fn upload_range(
        &self,
        remote: &str,
        offset: u64,
        data: &[u8],
        total_size: u64,
    ) -> Result<(), SyncError> {
        let result = async {
            if data.is_empty() {
                return Ok(());
            }
            let client = self.client().await?;
            let url = client.endpoint("content", &[("path", remote)])?;
            let range = format!("bytes {}-{}/{}", offset, offset + data.len() as u64 - 1, total_size);
            let payload = data.to_vec();
            let response = client
                .send(|http| {
                    http.put(url.clone())
                        .header("Content-Range", range.clone())
                        .header("Content-Type", "application/octet-stream")
                        .body(payload.clone())
                })
                .await?;
            DriveClient::expect_success(response).await?;
            Ok(())
        }
        .await;
        self.remember(result).await
    }

    async fn download_range(
        &self,
        remote: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<u8>, SyncError> {
        let result = async {
            if length == 0 {
                return Ok(Vec::new());
            }
            let client = self.client().await?;
            let url = client.endpoint("content", &[("path", remote)])?;
            let range = format!("bytes={}-{}", offset, offset + length - 1);
            let response = client
                .send(|http| http.get(url.clone()).header("Range", range.clone()))
                .await?;
            let response = DriveClient::expect_success(response).await?;
            let bytes = response
                .bytes()
                .await
                .map_err(crate::client::map_transport)?;
            Ok(bytes.to_vec())
        }
        .await;
        self.remember(result).await
    }

    async fn delete_file(&self, remote: &str) -> Result<bool, SyncError> {
        let result = self.delete_at("file", remote).await;
        self.remember(result).await
    }

    async fn file_exists(&self, remote: &str) -> Result<bool, SyncError> {
        Ok(self.get_metadata(remote).await?.is_some())
    }

    async fn get_metadata(&self, remote: &str) -> Result<Option<RemoteEntry>, SyncError> {
        let result = self.fetch_metadata(remote).await;
        self.remember(result).await
    }

    async fn list_files(
        &self,
        dir: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<RemoteEntry>, SyncError> {
        let result = async {
            let client = self.client().await?;
            let root = self.config.lock().await.remote_root.clone();
            let dir = dir.unwrap_or(&root);
            let recursive = if recursive { "true" } else { "false" };
            let url = client.endpoint("list", &[("dir", dir), ("recursive", recursive)])?;
            let response = client.send(|http| http.get(url.clone())).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(Vec::new());
            }
            let response = DriveClient::expect_success(response).await?;
            let dto: ListDto = response
                .json()
                .await
                .map_err(|e| SyncError::Provider(format!("bad list response: {e}")))?;
            Ok(dto.entries.into_iter().map(EntryDto::into_entry).collect())
        }
        .await;
        self.remember(result).await
    }

    async fn get_storage_quota(&self) -> Result<StorageQuota, SyncError> {
        let result = async {
            let client = self.client().await?;
            let url = client.endpoint("quota", &[])?;
            let response = client.send(|http| http.get(url.clone())).await?;
            let response = DriveClient::expect_success(response).await?;
            let dto: QuotaDto = response
                .json()
                .await
                .map_err(|e| SyncError::Provider(format!("bad quota response: {e}")))?;
            Ok(dto.into_quota())
        }
        .await;
        self.remember(result).await
    }

    async fn create_directory(&self, remote: &str) -> Result<(), SyncError> {
        let result = async {
            let client = self.client().await?;
            let url = client.endpoint("mkdir", &[])?;
            let body = MkdirRequest { path: remote };
            let response = client.send(|http| http.post(url.clone()).json(&body)).await?;
            DriveClient::expect_success(response).await?;
            Ok(())
        }
        .await;
        self.remember(result).await
    }

    async fn delete_directory(&self, remote: &str) -> Result<bool, SyncError> {
        let result = self.delete_at("dir", remote).await;
        self.remember(result).await
    }

    async fn move_file(&self, from: &str, to: &str) -> Result<RemoteEntry, SyncError> {
        let result = self.fetch_entry_via("move", from, to).await;
        self.remember(result).await
    }

    async fn copy_file(&self, from: &str, to: &str) -> Result<RemoteEntry, SyncError> {
        let result = self.fetch_entry_via("copy", from, to).await;
        self.remember(result).await
    }

    async fn get_shareable_link(&self, remote: &str) -> Result<Option<String>, SyncError> {
        let result = async {
            let client = self.client().await?;
            let url = client.endpoint("link", &[("path", remote)])?;
            let response = client.send(|http| http.get(url.clone())).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = DriveClient::expect_success(response).await?;
            let dto: LinkDto = response
                .json()
                .await
                .map_err(|e| SyncError::Provider(format!("bad link response: {e}")))?;
            Ok(Some(dto.url))
        }
        .await;
        self.remember(result).await
    }

    async fn get_remote_changes(
        &self,
        since: Option<DateTime<Utc>>,
        dir: Option<&str>,
    ) -> Result<Vec<RemoteChange>, SyncError> {
        let result = async {
            let client = self.client().await?;
            let mut query: Vec<(&str, String)> = Vec::new();
            if let Some(since) = since {
                query.push(("since", since.to_rfc3339()));
            }
            if let Some(dir) = dir {
                query.push(("dir", dir.to_string()));
            }
            let borrowed: Vec<(&str, &str)> =
                query.iter().map(|(k, v)| (*k, v.as_str())).collect();
            let url = client.endpoint("changes", &borrowed)?;
            let response = client.send(|http| http.get(url.clone())).await?;
            let response = DriveClient::expect_success(response).await?;
            let dto: ChangesDto = response
                .json()
                .await
                .map_err(|e| SyncError::Provider(format!("bad changes response: {e}")))?;
            Ok(dto.changes.into_iter().map(|c| c.into_change()).collect())
        }
        .await;
        self.remember(result).await
    }

    async fn get_configuration(&self) -> ProviderConfig {
        self.config.lock().await.clone()
    }

    async fn update_configuration(&self, config: ProviderConfig) -> Result<(), SyncError> {
        if config.simple_upload_threshold == 0 {
            return Err(SyncError::Configuration(
                "simple_upload_threshold must be positive".to_string(),
            ));
        }
        *self.config.lock().await = config;
        Ok(())
    }

    async fn test_connection(&self) -> bool {
        match self.ping().await {
            Ok(()) => true,
            Err(e) => {
                *self.last_error.lock().await = Some(e.to_string());
                false
            }
        }
    }

    async fn last_error(&self) -> Option<String> {
        self.last_error.lock().await.clone()
    }
}

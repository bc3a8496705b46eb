//! Serde DTOs for the Drive REST API's JSON bodies
//!
//! The API uses snake_case JSON throughout. Entry payloads carry RFC 3339
//! timestamps, which chrono's serde support parses directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use polysync_core::domain::chunk::ChangeType;
use polysync_core::ports::provider_adapter::{RemoteChange, RemoteEntry, StorageQuota};

/// One file or directory entry as the API returns it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDto {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub is_directory: bool,
}

impl EntryDto {
    pub fn into_entry(self) -> RemoteEntry {
        RemoteEntry {
            id: self.id,
            path: self.path,
            size: self.size,
            modified_at: self.modified_at,
            checksum: self.checksum,
            mime_type: self.mime_type,
            is_directory: self.is_directory,
        }
    }
}

/// Response body of a directory listing
#[derive(Debug, Deserialize)]
pub struct ListDto {
    pub entries: Vec<EntryDto>,
}

/// Response body of an upload session creation
#[derive(Debug, Deserialize)]
pub struct SessionDto {
    pub upload_url: String,
}

/// Request body for creating an upload session
#[derive(Debug, Serialize)]
pub struct SessionRequest<'a> {
    pub path: &'a str,
    pub size: u64,
}

/// Request body for move and copy
#[derive(Debug, Serialize)]
pub struct TransferRequest<'a> {
    pub from: &'a str,
    pub to: &'a str,
}

/// Request body for directory creation
#[derive(Debug, Serialize)]
pub struct MkdirRequest<'a> {
    pub path: &'a str,
}

/// Response body of the shareable-link endpoint
#[derive(Debug, Deserialize)]
pub struct LinkDto {
    pub url: String,
}

/// Response body of the quota endpoint
#[derive(Debug, Deserialize)]
pub struct QuotaDto {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

impl QuotaDto {
    pub fn into_quota(self) -> StorageQuota {
        StorageQuota {
            used_bytes: self.used_bytes,
            total_bytes: self.total_bytes,
        }
    }
}

/// One entry in the change feed
#[derive(Debug, Deserialize)]
pub struct ChangeDto {
    pub path: String,
    pub change_type: ChangeType,
    #[serde(default)]
    pub entry: Option<EntryDto>,
    pub changed_at: DateTime<Utc>,
}

impl ChangeDto {
    pub fn into_change(self) -> RemoteChange {
        RemoteChange {
            path: self.path,
            change_type: self.change_type,
            entry: self.entry.map(EntryDto::into_entry),
            changed_at: self.changed_at,
        }
    }
}

/// Response body of the change feed
#[derive(Debug, Deserialize)]
pub struct ChangesDto {
    pub changes: Vec<ChangeDto>,
}

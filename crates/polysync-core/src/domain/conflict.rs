//! Conflict domain entities
//!
//! A [`SyncConflict`] records a detected divergence between the local and
//! remote versions of one file at one provider. Conflicts are created by
//! the detector, resolved exactly once, and never resurrected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::provider::CloudProvider;
use super::version::FileVersion;

/// Classification of a detected divergence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both sides modified since the last sync
    ModifiedBoth,
    /// Deleted locally while the remote copy was recently modified
    DeletedLocal,
    /// Deleted remotely while the local copy was recently modified
    DeletedRemote,
    /// Sizes diverge significantly (>10% relative or >1MiB absolute)
    SizeMismatch,
    /// Content checksums differ while sizes agree
    ChecksumMismatch,
    /// MIME type changed between the two sides
    TypeChanged,
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConflictType::ModifiedBoth => "modified_both",
            ConflictType::DeletedLocal => "deleted_local",
            ConflictType::DeletedRemote => "deleted_remote",
            ConflictType::SizeMismatch => "size_mismatch",
            ConflictType::ChecksumMismatch => "checksum_mismatch",
            ConflictType::TypeChanged => "type_changed",
        };
        write!(f, "{}", s)
    }
}

/// How urgent a conflict is for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

/// How a conflict should be (or was) resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the local version, overwriting remote
    KeepLocal,
    /// Keep the remote version, overwriting local
    KeepRemote,
    /// Keep both versions (rename one with a conflict suffix)
    KeepBoth,
    /// Merge the two versions
    Merge,
    /// Requires user intervention
    Manual,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Resolution::KeepLocal => "keep_local",
            Resolution::KeepRemote => "keep_remote",
            Resolution::KeepBoth => "keep_both",
            Resolution::Merge => "merge",
            Resolution::Manual => "manual",
        };
        write!(f, "{}", s)
    }
}

/// The concrete file operation a resolution performed
///
/// Reported to the version-history collaborator so it can append an entry
/// describing what actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictAction {
    UploadedLocal,
    DownloadedRemote,
    DeletedLocal,
    DeletedRemote,
    KeptBoth,
    Merged,
    None,
}

/// Outcome of applying a resolution to one conflict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub conflict_id: Uuid,
    pub success: bool,
    pub action: ConflictAction,
    /// The file version that won, for version-history recording
    pub resulting_version: Option<FileVersion>,
    pub error: Option<String>,
}

impl ResolutionOutcome {
    pub fn success(conflict_id: Uuid, action: ConflictAction, version: FileVersion) -> Self {
        Self {
            conflict_id,
            success: true,
            action,
            resulting_version: Some(version),
            error: None,
        }
    }

    pub fn failure(conflict_id: Uuid, error: impl Into<String>) -> Self {
        Self {
            conflict_id,
            success: false,
            action: ConflictAction::None,
            resulting_version: None,
            error: Some(error.into()),
        }
    }

    /// A resolution that intentionally did nothing (manual deferral)
    pub fn skipped(conflict_id: Uuid) -> Self {
        Self {
            conflict_id,
            success: false,
            action: ConflictAction::None,
            resulting_version: None,
            error: None,
        }
    }
}

/// A detected divergence between local and remote versions of one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConflict {
    id: Uuid,
    file_path: PathBuf,
    provider: CloudProvider,
    conflict_type: ConflictType,
    local_version: FileVersion,
    remote_version: FileVersion,
    severity: ConflictSeverity,
    detected_at: DateTime<Utc>,
    resolution: Option<Resolution>,
    resolved_at: Option<DateTime<Utc>>,
    description: String,
}

impl SyncConflict {
    pub fn new(
        file_path: impl Into<PathBuf>,
        provider: CloudProvider,
        conflict_type: ConflictType,
        local_version: FileVersion,
        remote_version: FileVersion,
        severity: ConflictSeverity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            file_path: file_path.into(),
            provider,
            conflict_type,
            local_version,
            remote_version,
            severity,
            detected_at: Utc::now(),
            resolution: None,
            resolved_at: None,
            description: description.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn provider(&self) -> CloudProvider {
        self.provider
    }

    pub fn conflict_type(&self) -> ConflictType {
        self.conflict_type
    }

    pub fn local_version(&self) -> &FileVersion {
        &self.local_version
    }

    pub fn remote_version(&self) -> &FileVersion {
        &self.remote_version
    }

    pub fn severity(&self) -> ConflictSeverity {
        self.severity
    }

    pub fn detected_at(&self) -> DateTime<Utc> {
        self.detected_at
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    /// Marks the conflict resolved
    ///
    /// A conflict is resolved exactly once: resolving an already-resolved
    /// conflict is a no-op that preserves the original resolution record.
    pub fn mark_resolved(&mut self, resolution: Resolution) {
        if self.is_resolved() {
            return;
        }
        self.resolution = Some(resolution);
        self.resolved_at = Some(Utc::now());
    }
}

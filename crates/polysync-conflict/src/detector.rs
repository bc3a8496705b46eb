//! Conflict detection
//!
//! Classifies divergence between local and remote [`FileVersion`] snapshots
//! of one file. Classification is a pure function of the two snapshots, so
//! re-running detection on unchanged inputs always yields the same conflict
//! type and severity. Tree-wide detection unions local enumeration with the
//! provider's remote listing and runs the per-file check on every unique
//! path.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use tokio::fs;
use tracing::{debug, info};

use polysync_core::domain::conflict::{ConflictSeverity, ConflictType, SyncConflict};
use polysync_core::domain::errors::SyncError;
use polysync_core::domain::provider::CloudProvider;
use polysync_core::domain::version::FileVersion;
use polysync_core::ports::provider_adapter::ProviderAdapter;

use polysync_chunk::chunker::FileChunker;
use polysync_chunk::tracker::remote_path_for;

/// Deletions of files untouched for longer than this are not conflicts
const DELETION_STALENESS_DAYS: i64 = 30;

/// Absolute size delta above which a divergence is a size mismatch
const SIZE_DELTA_ABSOLUTE: u64 = 1024 * 1024;

/// Relative size delta above which a divergence is a size mismatch
const SIZE_DELTA_RELATIVE: f64 = 0.10;

/// Detects conflicts between local and remote file versions
///
/// Holds the local sync root so tree detection can map local paths to
/// their remote counterparts and back.
pub struct ConflictDetector {
    sync_root: PathBuf,
    chunker: FileChunker,
}

impl ConflictDetector {
    pub fn new(sync_root: impl Into<PathBuf>) -> Self {
        Self {
            sync_root: sync_root.into(),
            chunker: FileChunker::new(),
        }
    }

    pub fn sync_root(&self) -> &Path {
        &self.sync_root
    }

    /// Classifies the divergence between two version snapshots
    ///
    /// Returns `None` when the versions are identical, both sides are
    /// absent, or a one-sided deletion is stale. Otherwise returns an
    /// unresolved [`SyncConflict`]. Classification order: deletion, size,
    /// checksum, MIME type, then both-modified.
    pub fn classify(
        file_path: &Path,
        provider: CloudProvider,
        local: &FileVersion,
        remote: &FileVersion,
    ) -> Option<SyncConflict> {
        if !local.exists() && !remote.exists() {
            return None;
        }

        // One-sided deletion: only a conflict when the surviving side was
        // modified recently enough that the deletion could race with it.
        if local.exists() != remote.exists() {
            let (kind, surviving) = if local.exists() {
                (ConflictType::DeletedRemote, local)
            } else {
                (ConflictType::DeletedLocal, remote)
            };
            let age = Utc::now() - surviving.modified_at();
            if age > Duration::days(DELETION_STALENESS_DAYS) {
                debug!(
                    path = %file_path.display(),
                    age_days = age.num_days(),
                    "Stale one-sided deletion, not reporting a conflict"
                );
                return None;
            }
            let description = match kind {
                ConflictType::DeletedLocal => {
                    "deleted locally while the remote copy was recently modified"
                }
                _ => "deleted remotely while the local copy was recently modified",
            };
            return Some(Self::build(
                file_path,
                provider,
                kind,
                local,
                remote,
                ConflictSeverity::High,
                description,
            ));
        }

        if local.is_identical(remote) {
            return None;
        }

        if size_delta_significant(local.size(), remote.size()) {
            let description = format!(
                "sizes diverge significantly (local {} bytes, remote {} bytes)",
                local.size(),
                remote.size()
            );
            return Some(Self::build(
                file_path,
                provider,
                ConflictType::SizeMismatch,
                local,
                remote,
                ConflictSeverity::Medium,
                description,
            ));
        }

        if let (Some(l), Some(r)) = (local.checksum(), remote.checksum()) {
            if l != r {
                return Some(Self::build(
                    file_path,
                    provider,
                    ConflictType::ChecksumMismatch,
                    local,
                    remote,
                    ConflictSeverity::Medium,
                    "content checksums differ",
                ));
            }
        }

        if let (Some(l), Some(r)) = (local.mime_type(), remote.mime_type()) {
            if l != r {
                let description = format!("type changed ({} locally, {} remotely)", l, r);
                return Some(Self::build(
                    file_path,
                    provider,
                    ConflictType::TypeChanged,
                    local,
                    remote,
                    ConflictSeverity::Medium,
                    description,
                ));
            }
        }

        let severity = proximity_severity(local, remote);
        Some(Self::build(
            file_path,
            provider,
            ConflictType::ModifiedBoth,
            local,
            remote,
            severity,
            "both sides modified since the last sync",
        ))
    }

    /// Checks one file against its remote counterpart
    ///
    /// `local_path` must live under the sync root. Returns `Ok(None)` when
    /// the two sides agree.
    pub async fn detect_file(
        &self,
        provider: CloudProvider,
        adapter: &dyn ProviderAdapter,
        local_path: &Path,
    ) -> Result<Option<SyncConflict>, SyncError> {
        let remote_path = remote_path_for(&self.sync_root, local_path)?;
        let local = self.local_version(local_path).await?;
        let remote = remote_version(adapter, &remote_path).await?;

        let conflict = Self::classify(local_path, provider, &local, &remote);
        if let Some(ref c) = conflict {
            info!(
                path = %local_path.display(),
                provider = %provider,
                conflict_type = %c.conflict_type(),
                severity = ?c.severity(),
                "Conflict detected"
            );
        }
        Ok(conflict)
    }

    /// Checks the whole tree under the sync root against one provider
    ///
    /// The path set is the union of the local file enumeration and the
    /// provider's recursive listing, so files present on only one side are
    /// still checked for deletion conflicts.
    pub async fn detect_tree(
        &self,
        provider: CloudProvider,
        adapter: &dyn ProviderAdapter,
    ) -> Result<Vec<SyncConflict>, SyncError> {
        let mut paths: BTreeSet<PathBuf> = BTreeSet::new();

        for local in self.enumerate_local().await? {
            paths.insert(local);
        }
        for entry in adapter.list_files(None, true).await? {
            if entry.is_directory {
                continue;
            }
            paths.insert(self.local_path_for(&entry.path));
        }

        let mut conflicts = Vec::new();
        for path in paths {
            if let Some(conflict) = self.detect_file(provider, adapter, &path).await? {
                conflicts.push(conflict);
            }
        }

        debug!(
            root = %self.sync_root.display(),
            provider = %provider,
            conflicts = conflicts.len(),
            "Tree conflict check complete"
        );
        Ok(conflicts)
    }

    /// Maps a remote path (leading slash, `/`-separated) back under the root
    pub fn local_path_for(&self, remote: &str) -> PathBuf {
        let relative = remote.trim_start_matches('/');
        self.sync_root.join(relative)
    }

    /// Builds the local-side snapshot for a path, checksumming when present
    async fn local_version(&self, path: &Path) -> Result<FileVersion, SyncError> {
        let meta = match fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(FileVersion::absent(path));
            }
            Err(e) => {
                return Err(SyncError::Io(format!(
                    "cannot stat {}: {}",
                    path.display(),
                    e
                )));
            }
        };
        let modified = meta
            .modified()
            .map(chrono::DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let checksum = self.chunker.checksum_file(path).await?;
        Ok(FileVersion::new(path, meta.len(), modified).with_checksum(checksum))
    }

    async fn enumerate_local(&self) -> Result<Vec<PathBuf>, SyncError> {
        let mut files = Vec::new();
        let mut pending = vec![self.sync_root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(e) => e,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(SyncError::Io(format!(
                        "cannot read {}: {}",
                        dir.display(),
                        e
                    )));
                }
            };
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| SyncError::Io(e.to_string()))?
            {
                let path = entry.path();
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| SyncError::Io(e.to_string()))?;
                if file_type.is_dir() {
                    pending.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    fn build(
        file_path: &Path,
        provider: CloudProvider,
        kind: ConflictType,
        local: &FileVersion,
        remote: &FileVersion,
        severity: ConflictSeverity,
        description: impl Into<String>,
    ) -> SyncConflict {
        SyncConflict::new(
            file_path,
            provider,
            kind,
            local.clone(),
            remote.clone(),
            severity,
            description,
        )
    }
}

/// Fetches the remote-side snapshot, absent when the provider has no entry
pub async fn remote_version(
    adapter: &dyn ProviderAdapter,
    remote_path: &str,
) -> Result<FileVersion, SyncError> {
    match adapter.get_metadata(remote_path).await? {
        Some(entry) => Ok(entry.to_version()),
        None => Ok(FileVersion::absent(remote_path)),
    }
}

fn size_delta_significant(local: u64, remote: u64) -> bool {
    let delta = local.abs_diff(remote);
    if delta > SIZE_DELTA_ABSOLUTE {
        return true;
    }
    let larger = local.max(remote);
    if larger == 0 {
        return false;
    }
    delta as f64 / larger as f64 > SIZE_DELTA_RELATIVE
}

/// Severity grows with how close the two modification times are
///
/// Near-simultaneous edits suggest an active editing race; edits far apart
/// are more likely an overlooked stale copy.
fn proximity_severity(local: &FileVersion, remote: &FileVersion) -> ConflictSeverity {
    let gap = (local.modified_at() - remote.modified_at()).num_seconds().abs();
    if gap < 5 * 60 {
        ConflictSeverity::High
    } else if gap < 60 * 60 {
        ConflictSeverity::Medium
    } else {
        ConflictSeverity::Low
    }
}

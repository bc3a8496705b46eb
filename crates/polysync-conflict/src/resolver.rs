//! Conflict resolution executor
//!
//! Applies resolution policies by performing the actual file operations:
//! - `KeepLocal`: upload the local version, overwriting remote (or delete
//!   the remote copy when the local side is the deletion)
//! - `KeepRemote`: download the remote version, overwriting local (or
//!   delete the local copy when the remote side is the deletion)
//! - `KeepBoth`: rename the local copy with a conflict suffix, upload it,
//!   then download the remote version to the original path
//! - `Merge`: keep-both mechanics, reported as a merge
//! - `Manual`: no file operations, left for the user

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use polysync_core::domain::conflict::{
    ConflictAction, ConflictType, Resolution, ResolutionOutcome, SyncConflict,
};
use polysync_core::domain::version::FileVersion;
use polysync_core::ports::provider_adapter::ProviderAdapter;

use polysync_chunk::tracker::remote_path_for;

use crate::error::ConflictError;
use crate::namer::ConflictNamer;

/// Policy for automatic batch resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoResolveStrategy {
    /// Prefer non-destructive actions: content divergence keeps both
    /// versions, deletions and type changes are left for the user
    Conservative,
    /// Content divergence keeps whichever side was modified last;
    /// deletions are still left for the user
    NewestWins,
}

impl AutoResolveStrategy {
    /// Picks a resolution for one conflict under this strategy
    pub fn resolution_for(&self, conflict: &SyncConflict) -> Resolution {
        match conflict.conflict_type() {
            ConflictType::DeletedLocal | ConflictType::DeletedRemote => Resolution::Manual,
            ConflictType::TypeChanged => match self {
                AutoResolveStrategy::Conservative => Resolution::Manual,
                AutoResolveStrategy::NewestWins => self.newest(conflict),
            },
            ConflictType::ModifiedBoth
            | ConflictType::SizeMismatch
            | ConflictType::ChecksumMismatch => match self {
                AutoResolveStrategy::Conservative => Resolution::KeepBoth,
                AutoResolveStrategy::NewestWins => self.newest(conflict),
            },
        }
    }

    fn newest(&self, conflict: &SyncConflict) -> Resolution {
        if conflict.local_version().modified_at() >= conflict.remote_version().modified_at() {
            Resolution::KeepLocal
        } else {
            Resolution::KeepRemote
        }
    }
}

/// Applies conflict resolutions with real file operations
///
/// Holds the local sync root so conflict paths (always local, absolute)
/// can be mapped to their remote counterparts.
pub struct ConflictResolver {
    sync_root: PathBuf,
}

impl ConflictResolver {
    pub fn new(sync_root: impl Into<PathBuf>) -> Self {
        Self {
            sync_root: sync_root.into(),
        }
    }

    /// Applies one resolution to one conflict
    ///
    /// On success the conflict is marked resolved and the outcome carries
    /// the action taken plus the surviving file version. A failed file
    /// operation leaves the conflict unresolved and is reported inside the
    /// outcome, not as an `Err`; `Err` is reserved for misuse (resolving an
    /// already-resolved conflict).
    pub async fn resolve(
        &self,
        conflict: &mut SyncConflict,
        resolution: Resolution,
        adapter: &dyn ProviderAdapter,
    ) -> Result<ResolutionOutcome, ConflictError> {
        if conflict.is_resolved() {
            return Err(ConflictError::AlreadyResolved(conflict.id().to_string()));
        }

        info!(
            conflict_id = %conflict.id(),
            path = %conflict.file_path().display(),
            conflict_type = %conflict.conflict_type(),
            resolution = %resolution,
            "Applying conflict resolution"
        );

        if resolution == Resolution::Manual {
            debug!(conflict_id = %conflict.id(), "Manual resolution, no file operations");
            return Ok(ResolutionOutcome::skipped(conflict.id()));
        }

        let applied = match resolution {
            Resolution::KeepLocal => self.apply_keep_local(conflict, adapter).await,
            Resolution::KeepRemote => self.apply_keep_remote(conflict, adapter).await,
            Resolution::KeepBoth => {
                self.apply_keep_both(conflict, adapter, ConflictAction::KeptBoth)
                    .await
            }
            Resolution::Merge => {
                // No content-level merge yet; keep both versions so nothing
                // is lost and report the outcome as a merge.
                self.apply_keep_both(conflict, adapter, ConflictAction::Merged)
                    .await
            }
            Resolution::Manual => unreachable!("handled above"),
        };

        match applied {
            Ok((action, version)) => {
                conflict.mark_resolved(resolution);
                info!(
                    conflict_id = %conflict.id(),
                    action = ?action,
                    "Conflict resolved"
                );
                Ok(ResolutionOutcome::success(conflict.id(), action, version))
            }
            Err(e) => {
                warn!(
                    conflict_id = %conflict.id(),
                    error = %e,
                    "Conflict resolution failed"
                );
                Ok(ResolutionOutcome::failure(conflict.id(), e.to_string()))
            }
        }
    }

    /// Resolves a batch of conflicts under an automatic strategy
    ///
    /// Best effort: each conflict gets its own outcome and one failure
    /// never aborts the rest. Conflicts the strategy declines to touch are
    /// returned as skipped.
    pub async fn resolve_batch(
        &self,
        conflicts: &mut [SyncConflict],
        strategy: AutoResolveStrategy,
        adapter: &dyn ProviderAdapter,
    ) -> Vec<ResolutionOutcome> {
        let mut outcomes = Vec::with_capacity(conflicts.len());
        for conflict in conflicts.iter_mut() {
            let resolution = strategy.resolution_for(conflict);
            let outcome = match self.resolve(conflict, resolution, adapter).await {
                Ok(outcome) => outcome,
                Err(e) => ResolutionOutcome::failure(conflict.id(), e.to_string()),
            };
            outcomes.push(outcome);
        }

        let resolved = outcomes.iter().filter(|o| o.success).count();
        debug!(
            total = conflicts.len(),
            resolved,
            strategy = ?strategy,
            "Batch resolution complete"
        );
        outcomes
    }

    /// Keep local: upload it, or propagate the local deletion remotely
    async fn apply_keep_local(
        &self,
        conflict: &SyncConflict,
        adapter: &dyn ProviderAdapter,
    ) -> Result<(ConflictAction, FileVersion), ConflictError> {
        let local_path = conflict.file_path();
        let remote_path = self.remote_path(local_path)?;

        if conflict.local_version().exists() {
            debug!(path = %local_path.display(), "Keep-local: uploading local version");
            let entry = adapter
                .upload_file(local_path, &remote_path)
                .await
                .map_err(|e| ConflictError::ResolutionFailed(format!("upload: {e}")))?;
            Ok((ConflictAction::UploadedLocal, entry.to_version()))
        } else {
            debug!(path = %local_path.display(), "Keep-local: deleting remote copy");
            adapter
                .delete_file(&remote_path)
                .await
                .map_err(|e| ConflictError::ResolutionFailed(format!("delete remote: {e}")))?;
            Ok((ConflictAction::DeletedRemote, FileVersion::absent(&remote_path)))
        }
    }

    /// Keep remote: download it, or propagate the remote deletion locally
    async fn apply_keep_remote(
        &self,
        conflict: &SyncConflict,
        adapter: &dyn ProviderAdapter,
    ) -> Result<(ConflictAction, FileVersion), ConflictError> {
        let local_path = conflict.file_path();
        let remote_path = self.remote_path(local_path)?;

        if conflict.remote_version().exists() {
            debug!(path = %local_path.display(), "Keep-remote: downloading remote version");
            adapter
                .download_file(&remote_path, local_path)
                .await
                .map_err(|e| ConflictError::ResolutionFailed(format!("download: {e}")))?;
            let version = match adapter
                .get_metadata(&remote_path)
                .await
                .map_err(|e| ConflictError::ResolutionFailed(format!("metadata: {e}")))?
            {
                Some(entry) => entry.to_version(),
                None => conflict.remote_version().clone(),
            };
            Ok((ConflictAction::DownloadedRemote, version))
        } else {
            debug!(path = %local_path.display(), "Keep-remote: deleting local copy");
            remove_local(local_path).await?;
            Ok((ConflictAction::DeletedLocal, FileVersion::absent(local_path)))
        }
    }

    /// Keep both: local survives under a conflict name, remote reclaims
    /// the original path
    ///
    /// When one side is absent there is nothing to fork: the surviving
    /// version is simply copied to the other side.
    async fn apply_keep_both(
        &self,
        conflict: &SyncConflict,
        adapter: &dyn ProviderAdapter,
        action: ConflictAction,
    ) -> Result<(ConflictAction, FileVersion), ConflictError> {
        let local_path = conflict.file_path();
        let remote_path = self.remote_path(local_path)?;

        if !conflict.local_version().exists() {
            let (_, version) = self.apply_keep_remote(conflict, adapter).await?;
            return Ok((action, version));
        }
        if !conflict.remote_version().exists() {
            let (_, version) = self.apply_keep_local(conflict, adapter).await?;
            return Ok((action, version));
        }

        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                ConflictError::ResolutionFailed(format!(
                    "no usable file name in {}",
                    local_path.display()
                ))
            })?;
        let conflict_name = ConflictNamer::generate(file_name);
        let conflict_local = local_path.with_file_name(&conflict_name);
        let conflict_remote = self.remote_path(&conflict_local)?;

        debug!(
            path = %local_path.display(),
            conflict_copy = %conflict_name,
            "Keep-both: forking local version"
        );

        fs::rename(local_path, &conflict_local)
            .await
            .map_err(|e| ConflictError::ResolutionFailed(format!("rename local copy: {e}")))?;
        adapter
            .upload_file(&conflict_local, &conflict_remote)
            .await
            .map_err(|e| ConflictError::ResolutionFailed(format!("upload conflict copy: {e}")))?;
        adapter
            .download_file(&remote_path, local_path)
            .await
            .map_err(|e| ConflictError::ResolutionFailed(format!("download remote: {e}")))?;

        let version = match adapter
            .get_metadata(&remote_path)
            .await
            .map_err(|e| ConflictError::ResolutionFailed(format!("metadata: {e}")))?
        {
            Some(entry) => entry.to_version(),
            None => conflict.remote_version().clone(),
        };
        Ok((action, version))
    }

    fn remote_path(&self, local: &Path) -> Result<String, ConflictError> {
        remote_path_for(&self.sync_root, local)
            .map_err(|e| ConflictError::ResolutionFailed(e.to_string()))
    }
}

/// Deletes a local file, treating an already-absent file as success
async fn remove_local(path: &Path) -> Result<(), ConflictError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ConflictError::ResolutionFailed(format!(
            "delete local file: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use polysync_core::domain::conflict::ConflictSeverity;
    use polysync_core::domain::provider::CloudProvider;

    fn conflict_at(path: &Path, kind: ConflictType) -> SyncConflict {
        let local = FileVersion::new(path, 100, Utc::now()).with_checksum("aaa");
        let remote = FileVersion::new(path, 100, Utc::now()).with_checksum("bbb");
        SyncConflict::new(
            path,
            CloudProvider::Dropbox,
            kind,
            local,
            remote,
            ConflictSeverity::Medium,
            "test conflict",
        )
    }

    #[test]
    fn test_conservative_keeps_both_for_content_divergence() {
        let strategy = AutoResolveStrategy::Conservative;
        let p = Path::new("/root/a.txt");
        for kind in [
            ConflictType::ModifiedBoth,
            ConflictType::SizeMismatch,
            ConflictType::ChecksumMismatch,
        ] {
            let c = conflict_at(p, kind);
            assert_eq!(strategy.resolution_for(&c), Resolution::KeepBoth);
        }
    }

    #[test]
    fn test_conservative_defers_deletions_and_type_changes() {
        let strategy = AutoResolveStrategy::Conservative;
        let p = Path::new("/root/a.txt");
        for kind in [
            ConflictType::DeletedLocal,
            ConflictType::DeletedRemote,
            ConflictType::TypeChanged,
        ] {
            let c = conflict_at(p, kind);
            assert_eq!(strategy.resolution_for(&c), Resolution::Manual);
        }
    }

    #[test]
    fn test_newest_wins_prefers_later_side() {
        let p = Path::new("/root/a.txt");
        let older = FileVersion::new(p, 100, Utc::now() - chrono::Duration::hours(2));
        let newer = FileVersion::new(p, 120, Utc::now());

        let local_newer = SyncConflict::new(
            p,
            CloudProvider::Dropbox,
            ConflictType::ModifiedBoth,
            newer.clone(),
            older.clone(),
            ConflictSeverity::Low,
            "test",
        );
        let remote_newer = SyncConflict::new(
            p,
            CloudProvider::Dropbox,
            ConflictType::ModifiedBoth,
            older,
            newer,
            ConflictSeverity::Low,
            "test",
        );

        let strategy = AutoResolveStrategy::NewestWins;
        assert_eq!(strategy.resolution_for(&local_newer), Resolution::KeepLocal);
        assert_eq!(strategy.resolution_for(&remote_newer), Resolution::KeepRemote);
    }
}

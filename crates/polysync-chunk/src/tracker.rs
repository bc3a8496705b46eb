//! Change tracking
//!
//! Decides whether a file changed since its last sync and, when possible,
//! which chunks changed. Cheap shortcuts (existence, size, modification
//! time, full-file checksum) run before any chunk comparison so unchanged
//! files cost one `stat` and at most one hash.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use polysync_core::domain::chunk::{ChangeType, FileChange, FileChunk};
use polysync_core::domain::errors::SyncError;
use polysync_core::domain::provider::CloudProvider;
use polysync_core::domain::version::FileVersion;
use polysync_core::ports::provider_adapter::ProviderAdapter;

use crate::chunker::FileChunker;

/// Detects per-file and per-tree changes against a provider
///
/// Keeps an in-memory baseline of the chunk set last seen for each path;
/// with a baseline present, a modification yields the changed-chunk subset
/// for delta transfer. Without one, the change reports no chunk list and
/// the delta engine falls back to a full transfer.
pub struct ChangeTracker {
    chunker: FileChunker,
    baselines: Mutex<HashMap<PathBuf, Vec<FileChunk>>>,
    /// Fixed chunk size override for baseline chunking (None = adaptive)
    chunk_size: Option<u64>,
}

impl ChangeTracker {
    pub fn new(chunk_size: Option<u64>) -> Self {
        Self {
            chunker: FileChunker::new(),
            baselines: Mutex::new(HashMap::new()),
            chunk_size,
        }
    }

    /// Records the chunk set of a freshly synced file
    ///
    /// Chunk payloads are dropped; the baseline only needs checksums.
    pub async fn record_baseline(&self, path: &Path, chunks: &[FileChunk]) {
        let stripped: Vec<FileChunk> = chunks
            .iter()
            .map(|c| {
                let mut chunk = c.clone();
                chunk.data = None;
                chunk.is_changed = false;
                chunk
            })
            .collect();
        self.baselines
            .lock()
            .await
            .insert(path.to_path_buf(), stripped);
    }

    /// Forgets the baseline for a path (after deletion)
    pub async fn clear_baseline(&self, path: &Path) {
        self.baselines.lock().await.remove(path);
    }

    /// Checks a single file against its remote counterpart
    ///
    /// Returns `Ok(None)` when no change is detected.
    pub async fn detect_change(
        &self,
        local_path: &Path,
        remote_path: &str,
        provider: CloudProvider,
        adapter: &dyn ProviderAdapter,
    ) -> Result<Option<FileChange>, SyncError> {
        let local_meta = fs::metadata(local_path).await.ok();
        let remote = adapter.get_metadata(remote_path).await?;

        match (local_meta, remote) {
            (None, None) => Ok(None),
            (None, Some(_)) => {
                debug!(path = %local_path.display(), "Local file deleted");
                self.clear_baseline(local_path).await;
                Ok(Some(FileChange::new(
                    local_path,
                    provider,
                    ChangeType::Deleted,
                    0,
                )))
            }
            (Some(meta), None) => {
                debug!(path = %local_path.display(), "New local file");
                let chunks = self
                    .chunker
                    .create_chunks(local_path, self.chunk_size, true)
                    .await?;
                self.record_baseline(local_path, &chunks).await;
                Ok(Some(FileChange::new(
                    local_path,
                    provider,
                    ChangeType::Created,
                    meta.len(),
                )))
            }
            (Some(meta), Some(entry)) => {
                self.detect_modification(local_path, provider, &meta, &entry.to_version())
                    .await
            }
        }
    }

    /// Both sides exist: run shortcuts, then chunk comparison
    async fn detect_modification(
        &self,
        local_path: &Path,
        provider: CloudProvider,
        meta: &std::fs::Metadata,
        remote: &FileVersion,
    ) -> Result<Option<FileChange>, SyncError> {
        let local_size = meta.len();
        let local_mtime: DateTime<Utc> = meta
            .modified()
            .map(Into::into)
            .unwrap_or_else(|_| Utc::now());

        let local_version = FileVersion::new(local_path, local_size, local_mtime);
        if local_version.is_identical(remote) {
            trace!(path = %local_path.display(), "Unchanged (size + mtime)");
            return Ok(None);
        }

        // Checksum shortcut: same size but drifted mtime is usually a
        // touch, not an edit
        if local_size == remote.size() {
            if let Some(remote_checksum) = remote.checksum() {
                let local_checksum = self.chunker.checksum_file(local_path).await?;
                if local_checksum == remote_checksum {
                    trace!(path = %local_path.display(), "Unchanged (checksum)");
                    return Ok(None);
                }
            }
        }

        let current = self
            .chunker
            .create_chunks(local_path, self.chunk_size, true)
            .await?;

        let change = {
            let baselines = self.baselines.lock().await;
            match baselines.get(local_path) {
                Some(previous) => {
                    let changed = self.chunker.identify_changed_chunks(previous, &current);
                    if changed.is_empty() {
                        // Chunks agree with our own baseline even though the
                        // remote differs; report a full modification so the
                        // remote side gets reconciled.
                        FileChange::new(local_path, provider, ChangeType::Modified, local_size)
                    } else {
                        FileChange::new(local_path, provider, ChangeType::Modified, local_size)
                            .with_changed_chunks(changed)
                    }
                }
                None => {
                    FileChange::new(local_path, provider, ChangeType::Modified, local_size)
                }
            }
        };

        debug!(
            path = %local_path.display(),
            change_size = change.change_size,
            delta = change.has_delta(),
            "Local modification detected"
        );

        self.record_baseline(local_path, &current).await;
        Ok(Some(change))
    }

    /// Scans a directory tree, producing one change per differing file
    ///
    /// # Arguments
    /// * `root` - Local directory to scan
    /// * `provider` / `adapter` - Remote side to compare against
    /// * `recursive` - Whether to descend into subdirectories
    /// * `extensions` - Allow-list of file extensions (empty accepts all)
    pub async fn scan_directory(
        &self,
        root: &Path,
        provider: CloudProvider,
        adapter: &dyn ProviderAdapter,
        recursive: bool,
        extensions: &[String],
    ) -> Result<Vec<FileChange>, SyncError> {
        let mut changes = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| SyncError::Io(format!("cannot read {}: {}", dir.display(), e)))?;

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
                    if recursive {
                        pending.push(path);
                    }
                    continue;
                }
                if !extension_allowed(&path, extensions) {
                    continue;
                }

                let remote_path = remote_path_for(root, &path)?;
                if let Some(change) = self
                    .detect_change(&path, &remote_path, provider, adapter)
                    .await?
                {
                    changes.push(change);
                }
            }
        }

        debug!(
            root = %root.display(),
            changes = changes.len(),
            "Directory scan complete"
        );
        Ok(changes)
    }
}

/// Maps a local path under `root` to its remote counterpart
pub fn remote_path_for(root: &Path, local: &Path) -> Result<String, SyncError> {
    let relative = local.strip_prefix(root).map_err(|_| {
        SyncError::Io(format!(
            "{} is not under scan root {}",
            local.display(),
            root.display()
        ))
    })?;
    let mut remote = String::from("/");
    remote.push_str(&relative.to_string_lossy().replace('\\', "/"));
    Ok(remote)
}

fn extension_allowed(path: &Path, extensions: &[String]) -> bool {
    if extensions.is_empty() {
        return true;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|a| a.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

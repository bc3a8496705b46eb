//! Per-change transfer state machine
//!
//! [`DeltaSyncEngine::sync_change`] dispatches on the change type:
//!
//! - `created` → full upload or download, no chunk-level logic
//! - `modified` with changed chunks → transfer only those byte ranges,
//!   emitting a [`DeltaSyncProgress`] event after each chunk; without a
//!   usable chunk list, full-file transfer
//! - `deleted` → delete on the target side; deleting an already-absent
//!   target succeeds (idempotent)
//! - `moved`/`renamed` → provider-native move where available, falling
//!   back to delete+recreate
//! - `metadata_changed` → no-op (no standalone metadata update in the
//!   adapter contract)
//!
//! Every transfer returns a [`DeltaSyncReport`] with bandwidth accounting:
//! `saved_bytes` and `savings_percentage` say how much a delta transfer
//! avoided moving, for observability only.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use polysync_core::domain::chunk::{ChangeType, FileChange, FileChunk};
use polysync_core::domain::errors::SyncError;
use polysync_core::ports::provider_adapter::ProviderAdapter;

use polysync_chunk::tracker::remote_path_for;

/// Which side receives the change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Local is the source of truth; push to the provider
    Upload,
    /// Remote is the source of truth; pull to the local filesystem
    Download,
}

impl std::fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncDirection::Upload => write!(f, "upload"),
            SyncDirection::Download => write!(f, "download"),
        }
    }
}

/// Progress of one in-flight delta transfer, emitted after each chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaSyncProgress {
    pub file_path: PathBuf,
    pub direction: SyncDirection,
    pub completed_chunks: u32,
    pub total_chunks: u32,
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

/// Summary of one completed transfer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaSyncReport {
    pub file_path: PathBuf,
    pub change_type: ChangeType,
    pub direction: SyncDirection,
    pub bytes_transferred: u64,
    pub total_file_size: u64,
    pub chunks_transferred: u32,
    /// True when the whole file moved rather than a chunk subset
    pub full_transfer: bool,
}

impl DeltaSyncReport {
    fn new(change: &FileChange, direction: SyncDirection) -> Self {
        Self {
            file_path: change.file_path.clone(),
            change_type: change.change_type,
            direction,
            bytes_transferred: 0,
            total_file_size: change.file_size,
            chunks_transferred: 0,
            full_transfer: false,
        }
    }

    /// Bytes a delta transfer avoided moving
    pub fn saved_bytes(&self) -> u64 {
        self.total_file_size.saturating_sub(self.bytes_transferred)
    }

    /// Percentage of the file that did not need to move
    pub fn savings_percentage(&self) -> f64 {
        if self.total_file_size == 0 {
            return 0.0;
        }
        self.saved_bytes() as f64 / self.total_file_size as f64 * 100.0
    }
}

/// Executes file transfers, chunk-level where possible
///
/// Holds the local sync root for local-to-remote path mapping and an
/// optional progress channel; progress events are dropped silently when
/// nobody is listening.
pub struct DeltaSyncEngine {
    sync_root: PathBuf,
    progress: Option<mpsc::UnboundedSender<DeltaSyncProgress>>,
}

impl DeltaSyncEngine {
    pub fn new(sync_root: impl Into<PathBuf>) -> Self {
        Self {
            sync_root: sync_root.into(),
            progress: None,
        }
    }

    /// Attaches a progress channel
    pub fn with_progress(mut self, sender: mpsc::UnboundedSender<DeltaSyncProgress>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Applies one change in the given direction through the adapter
    pub async fn sync_change(
        &self,
        change: &FileChange,
        direction: SyncDirection,
        adapter: &dyn ProviderAdapter,
    ) -> Result<DeltaSyncReport, SyncError> {
        info!(
            path = %change.file_path.display(),
            change_type = %change.change_type,
            direction = %direction,
            delta = change.has_delta(),
            "Syncing change"
        );

        let report = match change.change_type {
            ChangeType::Created => self.full_transfer(change, direction, adapter).await?,
            ChangeType::Modified => match change.changed_chunks.as_deref() {
                Some(chunks) if !chunks.is_empty() => {
                    self.chunk_transfer(change, chunks, direction, adapter).await?
                }
                _ => {
                    debug!(
                        path = %change.file_path.display(),
                        "No usable chunk list, falling back to full transfer"
                    );
                    self.full_transfer(change, direction, adapter).await?
                }
            },
            ChangeType::Deleted => self.delete(change, direction, adapter).await?,
            ChangeType::Moved | ChangeType::Renamed => {
                self.relocate(change, direction, adapter).await?
            }
            ChangeType::MetadataChanged => {
                // Nothing to move; standalone metadata updates are not part
                // of the adapter contract.
                debug!(path = %change.file_path.display(), "Metadata-only change, skipping");
                DeltaSyncReport::new(change, direction)
            }
        };

        info!(
            path = %report.file_path.display(),
            bytes = report.bytes_transferred,
            saved = report.saved_bytes(),
            savings_pct = format!("{:.1}", report.savings_percentage()),
            "Change synced"
        );
        Ok(report)
    }

    async fn full_transfer(
        &self,
        change: &FileChange,
        direction: SyncDirection,
        adapter: &dyn ProviderAdapter,
    ) -> Result<DeltaSyncReport, SyncError> {
        let local = change.file_path();
        let remote = self.remote_path(local)?;
        let mut report = DeltaSyncReport::new(change, direction);
        report.full_transfer = true;

        match direction {
            SyncDirection::Upload => {
                adapter.upload_file(local, &remote).await?;
                report.bytes_transferred = change.file_size;
            }
            SyncDirection::Download => {
                adapter.download_file(&remote, local).await?;
                let size = fs::metadata(local)
                    .await
                    .map(|m| m.len())
                    .unwrap_or(change.file_size);
                report.bytes_transferred = size;
                report.total_file_size = size;
            }
        }
        Ok(report)
    }

    /// Moves only the changed chunk subset, one range at a time
    async fn chunk_transfer(
        &self,
        change: &FileChange,
        chunks: &[FileChunk],
        direction: SyncDirection,
        adapter: &dyn ProviderAdapter,
    ) -> Result<DeltaSyncReport, SyncError> {
        let local = change.file_path();
        let remote = self.remote_path(local)?;
        let mut report = DeltaSyncReport::new(change, direction);

        match direction {
            SyncDirection::Upload => {
                let mut file = File::open(local).await.map_err(|e| {
                    SyncError::Io(format!("cannot open {}: {}", local.display(), e))
                })?;
                for chunk in chunks {
                    let data = read_range(&mut file, chunk).await?;
                    adapter
                        .upload_range(&remote, chunk.offset, &data, change.file_size)
                        .await?;
                    report.bytes_transferred += data.len() as u64;
                    report.chunks_transferred += 1;
                    self.emit_progress(change, direction, &report, chunks.len() as u32);
                }
            }
            SyncDirection::Download => {
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .open(local)
                    .await
                    .map_err(|e| {
                        SyncError::Io(format!("cannot open {}: {}", local.display(), e))
                    })?;
                for chunk in chunks {
                    let data = adapter
                        .download_range(&remote, chunk.offset, chunk.size)
                        .await?;
                    file.seek(SeekFrom::Start(chunk.offset))
                        .await
                        .map_err(|e| SyncError::Io(e.to_string()))?;
                    file.write_all(&data)
                        .await
                        .map_err(|e| SyncError::Io(e.to_string()))?;
                    report.bytes_transferred += data.len() as u64;
                    report.chunks_transferred += 1;
                    self.emit_progress(change, direction, &report, chunks.len() as u32);
                }
                // The remote file may have shrunk past the last chunk
                file.set_len(change.file_size)
                    .await
                    .map_err(|e| SyncError::Io(e.to_string()))?;
                file.flush()
                    .await
                    .map_err(|e| SyncError::Io(e.to_string()))?;
            }
        }
        Ok(report)
    }

    async fn delete(
        &self,
        change: &FileChange,
        direction: SyncDirection,
        adapter: &dyn ProviderAdapter,
    ) -> Result<DeltaSyncReport, SyncError> {
        let local = change.file_path();
        let remote = self.remote_path(local)?;
        let report = DeltaSyncReport::new(change, direction);

        match direction {
            SyncDirection::Upload => {
                // Ok(false) means already absent, which is still success
                let existed = adapter.delete_file(&remote).await?;
                if !existed {
                    debug!(remote = %remote, "Remote file already absent");
                }
            }
            SyncDirection::Download => match fs::remove_file(local).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %local.display(), "Local file already absent");
                }
                Err(e) => return Err(SyncError::Io(e.to_string())),
            },
        }
        Ok(report)
    }

    /// Provider-native move, delete+recreate when the provider rejects it
    async fn relocate(
        &self,
        change: &FileChange,
        direction: SyncDirection,
        adapter: &dyn ProviderAdapter,
    ) -> Result<DeltaSyncReport, SyncError> {
        let new_local = change.new_path.as_deref().ok_or_else(|| {
            SyncError::Configuration(format!(
                "move of {} carries no target path",
                change.file_path.display()
            ))
        })?;
        let old_remote = self.remote_path(change.file_path())?;
        let new_remote = self.remote_path(new_local)?;
        let mut report = DeltaSyncReport::new(change, direction);

        match direction {
            SyncDirection::Upload => {
                match adapter.move_file(&old_remote, &new_remote).await {
                    Ok(_) => {}
                    Err(e) if !e.is_connectivity() => {
                        warn!(
                            from = %old_remote,
                            to = %new_remote,
                            error = %e,
                            "Native move failed, recreating at target path"
                        );
                        adapter.delete_file(&old_remote).await?;
                        adapter.upload_file(new_local, &new_remote).await?;
                        report.bytes_transferred = change.file_size;
                        report.full_transfer = true;
                    }
                    Err(e) => return Err(e),
                }
            }
            SyncDirection::Download => {
                if let Some(parent) = new_local.parent() {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|e| SyncError::Io(e.to_string()))?;
                }
                fs::rename(change.file_path(), new_local)
                    .await
                    .map_err(|e| SyncError::Io(e.to_string()))?;
            }
        }
        Ok(report)
    }

    fn emit_progress(
        &self,
        change: &FileChange,
        direction: SyncDirection,
        report: &DeltaSyncReport,
        total_chunks: u32,
    ) {
        if let Some(sender) = &self.progress {
            let _ = sender.send(DeltaSyncProgress {
                file_path: change.file_path.clone(),
                direction,
                completed_chunks: report.chunks_transferred,
                total_chunks,
                bytes_transferred: report.bytes_transferred,
                total_bytes: change.change_size,
            });
        }
    }

    fn remote_path(&self, local: &Path) -> Result<String, SyncError> {
        remote_path_for(&self.sync_root, local)
    }
}

async fn read_range(file: &mut File, chunk: &FileChunk) -> Result<Vec<u8>, SyncError> {
    let mut data = vec![0u8; chunk.size as usize];
    file.seek(SeekFrom::Start(chunk.offset))
        .await
        .map_err(|e| SyncError::Io(e.to_string()))?;
    file.read_exact(&mut data)
        .await
        .map_err(|e| SyncError::Io(format!("short read at {}: {}", chunk.offset, e)))?;
    Ok(data)
}

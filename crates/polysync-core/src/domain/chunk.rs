//! File chunks and change descriptions
//!
//! A [`FileChunk`] is a fixed-position byte range of a file with a content
//! checksum. Chunks for one file, sorted by `index`, form a contiguous byte
//! range `[0, file_size)` with no gaps or overlaps; `verify_contiguous`
//! checks that invariant.
//!
//! A [`FileChange`] describes how a file differs from its last-synced state
//! and optionally carries the changed chunk subset for delta transfer.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::provider::CloudProvider;

/// A fixed-position byte range of a file with a content checksum
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChunk {
    /// 0-based sequence position within the file
    pub index: u32,
    /// Byte offset in the original file
    pub offset: u64,
    /// Chunk length in bytes
    pub size: u64,
    /// SHA-256 of the chunk content, hex-encoded
    pub checksum: String,
    /// Set by change detection when this chunk differs from the previous set
    #[serde(default)]
    pub is_changed: bool,
    /// Raw chunk bytes, present only while a transfer is in flight
    #[serde(skip)]
    pub data: Option<Vec<u8>>,
}

impl FileChunk {
    pub fn new(index: u32, offset: u64, size: u64, checksum: impl Into<String>) -> Self {
        Self {
            index,
            offset,
            size,
            checksum: checksum.into(),
            is_changed: false,
            data: None,
        }
    }

    /// Exclusive end offset of this chunk
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Checks that a chunk sequence covers `[0, file_size)` contiguously
///
/// The slice must already be sorted by index. Returns the first violation
/// as an error message, or `Ok(())` when the invariant holds.
pub fn verify_contiguous(chunks: &[FileChunk], file_size: u64) -> Result<(), String> {
    let mut expected_offset = 0u64;
    for (position, chunk) in chunks.iter().enumerate() {
        if chunk.index as usize != position {
            return Err(format!(
                "chunk at position {} has index {}",
                position, chunk.index
            ));
        }
        if chunk.offset != expected_offset {
            return Err(format!(
                "chunk {} starts at {} but previous chunk ended at {}",
                chunk.index, chunk.offset, expected_offset
            ));
        }
        expected_offset = chunk.end();
    }
    if expected_offset != file_size {
        return Err(format!(
            "chunks cover {} bytes but file is {} bytes",
            expected_offset, file_size
        ));
    }
    Ok(())
}

/// How a file changed relative to its last-synced state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Moved,
    Renamed,
    MetadataChanged,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
            ChangeType::Moved => "moved",
            ChangeType::Renamed => "renamed",
            ChangeType::MetadataChanged => "metadata_changed",
        };
        write!(f, "{}", s)
    }
}

/// A detected difference between a file and its last-synced state
///
/// Produced by the change tracker, consumed by the delta sync engine.
/// `changed_chunks` is `Some` only when chunk-level comparison ran and
/// found a usable delta; the engine falls back to full transfer otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub file_path: PathBuf,
    pub provider: CloudProvider,
    pub change_type: ChangeType,
    /// Current total file size (0 for deletions)
    pub file_size: u64,
    /// Total bytes in the changed region (equals `file_size` for full
    /// transfers)
    pub change_size: u64,
    /// Changed chunk subset, when chunk comparison was possible
    pub changed_chunks: Option<Vec<FileChunk>>,
    /// Target path for moves/renames
    pub new_path: Option<PathBuf>,
}

impl FileChange {
    pub fn new(
        file_path: impl Into<PathBuf>,
        provider: CloudProvider,
        change_type: ChangeType,
        file_size: u64,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            provider,
            change_type,
            file_size,
            change_size: file_size,
            changed_chunks: None,
            new_path: None,
        }
    }

    pub fn with_changed_chunks(mut self, chunks: Vec<FileChunk>) -> Self {
        self.change_size = chunks.iter().map(|c| c.size).sum();
        self.changed_chunks = Some(chunks);
        self
    }

    pub fn with_new_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.new_path = Some(path.into());
        self
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    /// Returns true if a chunk-level delta transfer is possible
    pub fn has_delta(&self) -> bool {
        self.changed_chunks
            .as_ref()
            .map_or(false, |chunks| !chunks.is_empty())
    }
}

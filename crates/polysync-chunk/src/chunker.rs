//! Content-addressable file chunking
//!
//! Chunk size is chosen adaptively per file: a base size keyed by the
//! file's extension category, refined by absolute file size, clamped to
//! `[64KiB, 16MiB]`, and recomputed when the resulting chunk count would
//! exceed [`MAX_CHUNK_COUNT`].

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, warn};

use polysync_core::domain::chunk::{verify_contiguous, FileChunk};
use polysync_core::domain::errors::SyncError;

/// Smallest permitted chunk size: 64 KiB
pub const MIN_CHUNK_SIZE: u64 = 64 * 1024;

/// Largest permitted chunk size: 16 MiB
pub const MAX_CHUNK_SIZE: u64 = 16 * 1024 * 1024;

/// A file never splits into more chunks than this
pub const MAX_CHUNK_COUNT: u64 = 1000;

/// Files under this are "small" for sizing purposes: 1 MiB
const SMALL_FILE_LIMIT: u64 = 1024 * 1024;

/// Files over this are "large" for sizing purposes: 100 MiB
const LARGE_FILE_LIMIT: u64 = 100 * 1024 * 1024;

/// Extension-derived content category used by the sizing table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentCategory {
    Text,
    Audio,
    Video,
    Default,
}

impl ContentCategory {
    fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("txt" | "md" | "json" | "xml" | "csv" | "log" | "html") => {
                ContentCategory::Text
            }
            Some("mp3" | "m4a" | "wav" | "flac" | "ogg" | "aac") => ContentCategory::Audio,
            Some("mp4" | "mov" | "mkv" | "avi" | "webm") => ContentCategory::Video,
            _ => ContentCategory::Default,
        }
    }

    /// Sizing table: (small-file, base, large-file) chunk sizes in bytes
    fn table(&self) -> (u64, u64, u64) {
        match self {
            ContentCategory::Text => (64 * 1024, 256 * 1024, 1024 * 1024),
            ContentCategory::Audio => (128 * 1024, 1024 * 1024, 4 * 1024 * 1024),
            ContentCategory::Video => (256 * 1024, 4 * 1024 * 1024, 16 * 1024 * 1024),
            ContentCategory::Default => (64 * 1024, 512 * 1024, 8 * 1024 * 1024),
        }
    }
}

/// Picks the chunk size for a file of the given path and size
///
/// Category table entry, refined by file size, clamped, then capped so the
/// chunk count never exceeds [`MAX_CHUNK_COUNT`].
pub fn adaptive_chunk_size(path: &Path, file_size: u64) -> u64 {
    let (small, base, large) = ContentCategory::from_path(path).table();

    let mut size = if file_size < SMALL_FILE_LIMIT {
        small
    } else if file_size > LARGE_FILE_LIMIT {
        large
    } else {
        base
    };

    size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);

    // Cap the chunk count by growing the chunk size
    if file_size > 0 && file_size.div_ceil(size) > MAX_CHUNK_COUNT {
        size = file_size.div_ceil(MAX_CHUNK_COUNT).min(MAX_CHUNK_SIZE);
    }

    size
}

/// Hex-encoded SHA-256 of a byte slice
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Splits files into checksummed chunks and reassembles them
#[derive(Debug, Default)]
pub struct FileChunker;

impl FileChunker {
    pub fn new() -> Self {
        Self
    }

    /// Splits a file into an ordered, contiguous chunk sequence
    ///
    /// # Arguments
    /// * `path` - The file to chunk
    /// * `chunk_size` - Fixed size override; `None` picks adaptively
    /// * `with_checksums` - Whether to compute per-chunk SHA-256 checksums
    ///
    /// # Errors
    /// `SyncError::Io` when the file is missing or unreadable.
    pub async fn create_chunks(
        &self,
        path: &Path,
        chunk_size: Option<u64>,
        with_checksums: bool,
    ) -> Result<Vec<FileChunk>, SyncError> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| SyncError::Io(format!("cannot stat {}: {}", path.display(), e)))?;
        let file_size = metadata.len();

        let size = chunk_size
            .map(|s| s.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE))
            .unwrap_or_else(|| adaptive_chunk_size(path, file_size));

        debug!(
            path = %path.display(),
            file_size,
            chunk_size = size,
            "Chunking file"
        );

        let mut file = fs::File::open(path)
            .await
            .map_err(|e| SyncError::Io(format!("cannot open {}: {}", path.display(), e)))?;

        let mut chunks = Vec::with_capacity(file_size.div_ceil(size.max(1)) as usize);
        let mut offset = 0u64;
        let mut index = 0u32;
        let mut buffer = vec![0u8; size as usize];

        loop {
            let read = read_full(&mut file, &mut buffer).await?;
            if read == 0 {
                break;
            }
            let data = &buffer[..read];
            let checksum = if with_checksums {
                checksum_bytes(data)
            } else {
                String::new()
            };
            let mut chunk = FileChunk::new(index, offset, read as u64, checksum);
            chunk.data = Some(data.to_vec());
            chunks.push(chunk);

            offset += read as u64;
            index += 1;
        }

        // The read loop produces exactly this shape; check it anyway so a
        // concurrent writer shows up as an error instead of corrupt state.
        if let Err(violation) = verify_contiguous(&chunks, offset) {
            return Err(SyncError::Integrity(format!(
                "chunking produced a non-contiguous sequence for {}: {}",
                path.display(),
                violation
            )));
        }

        Ok(chunks)
    }

    /// Returns the chunks of `current` that differ from `previous`
    ///
    /// Comparison is positional by `index`: a chunk present only in
    /// `current` (the file grew) is changed; a chunk whose checksum differs
    /// at the same index is changed; chunks only in `previous` (the file
    /// shrank) are dropped, not reported.
    pub fn identify_changed_chunks(
        &self,
        previous: &[FileChunk],
        current: &[FileChunk],
    ) -> Vec<FileChunk> {
        current
            .iter()
            .filter(|chunk| {
                match previous.iter().find(|p| p.index == chunk.index) {
                    Some(prev) => prev.checksum != chunk.checksum,
                    None => true,
                }
            })
            .map(|chunk| {
                let mut changed = chunk.clone();
                changed.is_changed = true;
                changed
            })
            .collect()
    }

    /// Writes chunks back into a file, optionally verifying the result
    ///
    /// Chunks are sorted by index before writing. With `verify`, every
    /// chunk's checksum is recomputed from the written file and the total
    /// length is checked; any mismatch is `SyncError::Integrity`.
    pub async fn reassemble(
        &self,
        output: &Path,
        chunks: &[FileChunk],
        verify: bool,
    ) -> Result<(), SyncError> {
        let mut ordered: Vec<&FileChunk> = chunks.iter().collect();
        ordered.sort_by_key(|c| c.index);

        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SyncError::Io(format!("cannot create {}: {}", parent.display(), e)))?;
        }

        let mut file = fs::File::create(output)
            .await
            .map_err(|e| SyncError::Io(format!("cannot create {}: {}", output.display(), e)))?;

        let mut total = 0u64;
        for chunk in &ordered {
            let data = chunk.data.as_deref().ok_or_else(|| {
                SyncError::Integrity(format!("chunk {} carries no data", chunk.index))
            })?;
            if data.len() as u64 != chunk.size {
                return Err(SyncError::Integrity(format!(
                    "chunk {} data length {} does not match declared size {}",
                    chunk.index,
                    data.len(),
                    chunk.size
                )));
            }
            file.write_all(data)
                .await
                .map_err(|e| SyncError::Io(format!("write failed: {}", e)))?;
            total += chunk.size;
        }
        file.flush()
            .await
            .map_err(|e| SyncError::Io(format!("flush failed: {}", e)))?;
        drop(file);

        if verify {
            self.verify_reassembly(output, &ordered, total).await?;
        }

        Ok(())
    }

    /// Re-reads the written file and checks per-chunk checksums plus total
    /// length
    async fn verify_reassembly(
        &self,
        output: &Path,
        ordered: &[&FileChunk],
        expected_len: u64,
    ) -> Result<(), SyncError> {
        let metadata = fs::metadata(output)
            .await
            .map_err(|e| SyncError::Io(format!("cannot stat {}: {}", output.display(), e)))?;
        if metadata.len() != expected_len {
            warn!(
                path = %output.display(),
                expected = expected_len,
                actual = metadata.len(),
                "Reassembled file has wrong length"
            );
            return Err(SyncError::Integrity(format!(
                "reassembled {} is {} bytes, expected {}",
                output.display(),
                metadata.len(),
                expected_len
            )));
        }

        let mut file = fs::File::open(output)
            .await
            .map_err(|e| SyncError::Io(format!("cannot open {}: {}", output.display(), e)))?;

        for chunk in ordered {
            if chunk.checksum.is_empty() {
                continue;
            }
            file.seek(std::io::SeekFrom::Start(chunk.offset))
                .await
                .map_err(|e| SyncError::Io(format!("seek failed: {}", e)))?;
            let mut buffer = vec![0u8; chunk.size as usize];
            file.read_exact(&mut buffer)
                .await
                .map_err(|e| SyncError::Io(format!("read failed: {}", e)))?;
            let actual = checksum_bytes(&buffer);
            if actual != chunk.checksum {
                return Err(SyncError::Integrity(format!(
                    "chunk {} checksum mismatch after reassembly",
                    chunk.index
                )));
            }
        }

        Ok(())
    }

    /// Full-file SHA-256 checksum, streamed
    pub async fn checksum_file(&self, path: &Path) -> Result<String, SyncError> {
        let mut file = fs::File::open(path)
            .await
            .map_err(|e| SyncError::Io(format!("cannot open {}: {}", path.display(), e)))?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; 256 * 1024];
        loop {
            let read = file
                .read(&mut buffer)
                .await
                .map_err(|e| SyncError::Io(format!("read failed: {}", e)))?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Reads until the buffer is full or EOF, returning the byte count
async fn read_full(file: &mut fs::File, buffer: &mut [u8]) -> Result<usize, SyncError> {
    let mut filled = 0;
    while filled < buffer.len() {
        let read = file
            .read(&mut buffer[filled..])
            .await
            .map_err(|e| SyncError::Io(format!("read failed: {}", e)))?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    async fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).await.unwrap();
        path
    }

    #[test]
    fn test_adaptive_size_category_table() {
        // Mid-sized files use the base entry for their category
        let mid = 10 * 1024 * 1024;
        assert_eq!(adaptive_chunk_size(Path::new("a.txt"), mid), 256 * 1024);
        assert_eq!(adaptive_chunk_size(Path::new("a.mp3"), mid), 1024 * 1024);
        assert_eq!(adaptive_chunk_size(Path::new("a.mp4"), mid), 4 * 1024 * 1024);
        assert_eq!(adaptive_chunk_size(Path::new("a.bin"), mid), 512 * 1024);
    }

    #[test]
    fn test_adaptive_size_small_and_large_refinement() {
        assert_eq!(adaptive_chunk_size(Path::new("a.txt"), 100), 64 * 1024);
        assert_eq!(
            adaptive_chunk_size(Path::new("a.mp4"), 200 * 1024 * 1024),
            16 * 1024 * 1024
        );
        assert_eq!(
            adaptive_chunk_size(Path::new("a.bin"), 200 * 1024 * 1024),
            8 * 1024 * 1024
        );
    }

    #[test]
    fn test_adaptive_size_chunk_count_cap() {
        // 1 GiB of text at 1 MiB large-entry would be 1024 chunks; the cap
        // recomputes to ceil(size/1000)
        let size = 1024 * 1024 * 1024u64;
        let chosen = adaptive_chunk_size(Path::new("huge.txt"), size);
        assert!(size.div_ceil(chosen) <= MAX_CHUNK_COUNT);
        assert_eq!(chosen, size.div_ceil(MAX_CHUNK_COUNT));
    }

    #[test]
    fn test_adaptive_size_clamped() {
        let chosen = adaptive_chunk_size(Path::new("a.txt"), 500);
        assert!(chosen >= MIN_CHUNK_SIZE);
        assert!(chosen <= MAX_CHUNK_SIZE);
    }

    #[tokio::test]
    async fn test_create_chunks_missing_file() {
        let chunker = FileChunker::new();
        let err = chunker
            .create_chunks(Path::new("/no/such/file"), None, true)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
    }

    #[tokio::test]
    async fn test_chunk_round_trip() {
        let dir = TempDir::new().unwrap();
        let content: Vec<u8> = (0..300_000u32).map(|i| (i % 251) as u8).collect();
        let path = write_file(&dir, "data.bin", &content).await;

        let chunker = FileChunker::new();
        let chunks = chunker
            .create_chunks(&path, Some(MIN_CHUNK_SIZE), true)
            .await
            .unwrap();
        assert_eq!(chunks.len(), 300_000usize.div_ceil(MIN_CHUNK_SIZE as usize));

        let output = dir.path().join("restored.bin");
        chunker.reassemble(&output, &chunks, true).await.unwrap();

        let restored = fs::read(&output).await.unwrap();
        assert_eq!(restored, content);
    }

    #[tokio::test]
    async fn test_reassemble_unsorted_chunks() {
        let dir = TempDir::new().unwrap();
        let content = vec![7u8; 200_000];
        let path = write_file(&dir, "data.bin", &content).await;

        let chunker = FileChunker::new();
        let mut chunks = chunker
            .create_chunks(&path, Some(MIN_CHUNK_SIZE), true)
            .await
            .unwrap();
        chunks.reverse();

        let output = dir.path().join("restored.bin");
        chunker.reassemble(&output, &chunks, true).await.unwrap();
        assert_eq!(fs::read(&output).await.unwrap(), content);
    }

    #[tokio::test]
    async fn test_reassemble_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "data.bin", &vec![1u8; 100_000]).await;

        let chunker = FileChunker::new();
        let mut chunks = chunker
            .create_chunks(&path, Some(MIN_CHUNK_SIZE), true)
            .await
            .unwrap();
        // Corrupt one chunk's payload without updating its checksum
        if let Some(data) = chunks[0].data.as_mut() {
            data[0] ^= 0xFF;
        }

        let output = dir.path().join("restored.bin");
        let err = chunker.reassemble(&output, &chunks, true).await.unwrap_err();
        assert!(matches!(err, SyncError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_reassemble_rejects_dataless_chunk() {
        let dir = TempDir::new().unwrap();
        let chunker = FileChunker::new();
        let chunk = FileChunk::new(0, 0, 10, "abc");
        let err = chunker
            .reassemble(&dir.path().join("out"), &[chunk], false)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Integrity(_)));
    }

    #[tokio::test]
    async fn test_identify_changed_chunks_same_set_empty() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "data.bin", &vec![9u8; 150_000]).await;
        let chunker = FileChunker::new();
        let chunks = chunker
            .create_chunks(&path, Some(MIN_CHUNK_SIZE), true)
            .await
            .unwrap();

        assert!(chunker.identify_changed_chunks(&chunks, &chunks).is_empty());
    }

    #[tokio::test]
    async fn test_identify_changed_chunks_growth_and_modification() {
        let dir = TempDir::new().unwrap();
        let old_content = vec![1u8; 150_000];
        let mut new_content = old_content.clone();
        new_content[0] = 2; // modifies chunk 0
        new_content.extend(vec![3u8; 100_000]); // grows past chunk 2

        let old_path = write_file(&dir, "old.bin", &old_content).await;
        let new_path = write_file(&dir, "new.bin", &new_content).await;

        let chunker = FileChunker::new();
        let previous = chunker
            .create_chunks(&old_path, Some(MIN_CHUNK_SIZE), true)
            .await
            .unwrap();
        let current = chunker
            .create_chunks(&new_path, Some(MIN_CHUNK_SIZE), true)
            .await
            .unwrap();

        let changed = chunker.identify_changed_chunks(&previous, &current);
        let changed_indices: Vec<u32> = changed.iter().map(|c| c.index).collect();

        // Chunk 0 modified; chunk 2 changed (boundary content shifted from
        // 150000 to 250000 total); chunks 3.. are new
        assert!(changed_indices.contains(&0));
        assert!(!changed_indices.contains(&1));
        assert!(changed.iter().all(|c| c.is_changed));
        assert!(*changed_indices.iter().max().unwrap() as usize == current.len() - 1);
    }

    #[tokio::test]
    async fn test_shrunk_file_drops_trailing_chunks() {
        let dir = TempDir::new().unwrap();
        let old_path = write_file(&dir, "old.bin", &vec![1u8; 200_000]).await;
        let new_path = write_file(&dir, "new.bin", &vec![1u8; 70_000]).await;

        let chunker = FileChunker::new();
        let previous = chunker
            .create_chunks(&old_path, Some(MIN_CHUNK_SIZE), true)
            .await
            .unwrap();
        let current = chunker
            .create_chunks(&new_path, Some(MIN_CHUNK_SIZE), true)
            .await
            .unwrap();

        let changed = chunker.identify_changed_chunks(&previous, &current);
        // Chunk 0 unchanged (same prefix); chunk 1 shrank so its checksum
        // differs; nothing beyond current's last index is reported
        assert!(changed.iter().all(|c| (c.index as usize) < current.len()));
    }

    #[tokio::test]
    async fn test_checksum_file_matches_bytes() {
        let dir = TempDir::new().unwrap();
        let content = b"hello chunked world";
        let path = write_file(&dir, "x.txt", content).await;

        let chunker = FileChunker::new();
        let streamed = chunker.checksum_file(&path).await.unwrap();
        assert_eq!(streamed, checksum_bytes(content));
    }
}

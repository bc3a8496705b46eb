//! Integration tests for the change tracker against an in-memory provider

use std::path::Path;

use tempfile::TempDir;
use tokio::fs;

use polysync_chunk::chunker::checksum_bytes;
use polysync_chunk::ChangeTracker;
use polysync_core::domain::chunk::ChangeType;
use polysync_core::domain::provider::CloudProvider;
use polysync_core::ports::memory::MemoryAdapter;

const CHUNK: u64 = 64 * 1024;

async fn local_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).await.unwrap();
    path
}

#[tokio::test]
async fn new_local_file_reports_created() {
    let dir = TempDir::new().unwrap();
    let path = local_file(&dir, "a.txt", b"hello").await;
    let adapter = MemoryAdapter::connected(CloudProvider::GoogleDrive);
    let tracker = ChangeTracker::new(Some(CHUNK));

    let change = tracker
        .detect_change(&path, "/a.txt", CloudProvider::GoogleDrive, &adapter)
        .await
        .unwrap()
        .expect("expected a change");

    assert_eq!(change.change_type, ChangeType::Created);
    assert_eq!(change.file_size, 5);
}

#[tokio::test]
async fn unchanged_file_reports_none() {
    let dir = TempDir::new().unwrap();
    let content = b"stable content".to_vec();
    let path = local_file(&dir, "a.txt", &content).await;

    let adapter = MemoryAdapter::connected(CloudProvider::GoogleDrive);
    adapter.put_file("/a.txt", content.clone(), Some(checksum_bytes(&content)));

    let tracker = ChangeTracker::new(Some(CHUNK));
    let change = tracker
        .detect_change(&path, "/a.txt", CloudProvider::GoogleDrive, &adapter)
        .await
        .unwrap();

    // Same size and matching checksum: nothing to sync even though the
    // remote mtime differs from the local one
    assert!(change.is_none());
}

#[tokio::test]
async fn rerun_on_untouched_file_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let content = b"stable".to_vec();
    let path = local_file(&dir, "a.txt", &content).await;
    let adapter = MemoryAdapter::connected(CloudProvider::GoogleDrive);
    adapter.put_file("/a.txt", content.clone(), Some(checksum_bytes(&content)));

    let tracker = ChangeTracker::new(Some(CHUNK));
    for _ in 0..3 {
        let change = tracker
            .detect_change(&path, "/a.txt", CloudProvider::GoogleDrive, &adapter)
            .await
            .unwrap();
        assert!(change.is_none());
    }
}

#[tokio::test]
async fn modified_file_with_baseline_yields_chunk_delta() {
    let dir = TempDir::new().unwrap();
    let original: Vec<u8> = vec![1u8; 3 * CHUNK as usize];
    let path = local_file(&dir, "big.bin", &original).await;
    let adapter = MemoryAdapter::connected(CloudProvider::Dropbox);

    let tracker = ChangeTracker::new(Some(CHUNK));
    // First detection: Created, baseline recorded
    let first = tracker
        .detect_change(&path, "/big.bin", CloudProvider::Dropbox, &adapter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.change_type, ChangeType::Created);
    adapter.put_file("/big.bin", original.clone(), Some(checksum_bytes(&original)));

    // Let the mtime drift past the 1-second identity tolerance before
    // modifying only the middle chunk
    tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
    let mut modified = original.clone();
    modified[CHUNK as usize + 10] = 99;
    fs::write(&path, &modified).await.unwrap();

    let change = tracker
        .detect_change(&path, "/big.bin", CloudProvider::Dropbox, &adapter)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(change.change_type, ChangeType::Modified);
    assert!(change.has_delta());
    let chunks = change.changed_chunks.as_ref().unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].index, 1);
    assert_eq!(change.change_size, CHUNK);
}

#[tokio::test]
async fn deleted_local_file_reports_deleted() {
    let dir = TempDir::new().unwrap();
    let adapter = MemoryAdapter::connected(CloudProvider::OneDrive);
    adapter.put_file("/gone.txt", b"remote copy".to_vec(), None);

    let tracker = ChangeTracker::new(Some(CHUNK));
    let change = tracker
        .detect_change(
            &dir.path().join("gone.txt"),
            "/gone.txt",
            CloudProvider::OneDrive,
            &adapter,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(change.change_type, ChangeType::Deleted);
    assert_eq!(change.file_size, 0);
}

#[tokio::test]
async fn both_absent_reports_none() {
    let dir = TempDir::new().unwrap();
    let adapter = MemoryAdapter::connected(CloudProvider::OneDrive);
    let tracker = ChangeTracker::new(Some(CHUNK));

    let change = tracker
        .detect_change(
            &dir.path().join("never.txt"),
            "/never.txt",
            CloudProvider::OneDrive,
            &adapter,
        )
        .await
        .unwrap();
    assert!(change.is_none());
}

#[tokio::test]
async fn scan_honors_extension_allow_list_and_recursion() {
    let dir = TempDir::new().unwrap();
    local_file(&dir, "a.txt", b"one").await;
    local_file(&dir, "b.bin", b"two").await;
    fs::create_dir(dir.path().join("sub")).await.unwrap();
    fs::write(dir.path().join("sub/c.txt"), b"three")
        .await
        .unwrap();

    let adapter = MemoryAdapter::connected(CloudProvider::GoogleDrive);
    let tracker = ChangeTracker::new(Some(CHUNK));

    let changes = tracker
        .scan_directory(
            dir.path(),
            CloudProvider::GoogleDrive,
            &adapter,
            true,
            &["txt".to_string()],
        )
        .await
        .unwrap();

    let mut paths: Vec<String> = changes
        .iter()
        .map(|c| c.file_path().file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    paths.sort();
    assert_eq!(paths, vec!["a.txt", "c.txt"]);

    // Non-recursive scan sees only the top-level file
    let tracker = ChangeTracker::new(Some(CHUNK));
    let shallow = tracker
        .scan_directory(
            Path::new(dir.path()),
            CloudProvider::GoogleDrive,
            &adapter,
            false,
            &["txt".to_string()],
        )
        .await
        .unwrap();
    assert_eq!(shallow.len(), 1);
}

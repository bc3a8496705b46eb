//! End-to-end detection and resolution against an in-memory provider

use std::path::Path;

use chrono::{Duration, Utc};
use tempfile::TempDir;

use polysync_conflict::{AutoResolveStrategy, ConflictDetector, ConflictError, ConflictResolver};
use polysync_core::domain::conflict::{
    ConflictAction, ConflictSeverity, ConflictType, Resolution, SyncConflict,
};
use polysync_core::domain::provider::CloudProvider;
use polysync_core::domain::version::FileVersion;
use polysync_core::ports::memory::MemoryAdapter;
use polysync_core::ports::provider_adapter::ProviderAdapter;

fn adapter() -> MemoryAdapter {
    MemoryAdapter::connected(CloudProvider::Dropbox)
}

async fn write_local(dir: &TempDir, name: &str, contents: &[u8]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    tokio::fs::write(&path, contents).await.unwrap();
    path
}

/// Builds a conflict whose version snapshots match the on-disk/in-memory
/// state the test has set up
fn conflict_for(
    path: &Path,
    kind: ConflictType,
    local_exists: bool,
    remote_exists: bool,
) -> SyncConflict {
    let local = if local_exists {
        FileVersion::new(path, 11, Utc::now()).with_checksum("local-sum")
    } else {
        FileVersion::absent(path)
    };
    let remote = if remote_exists {
        FileVersion::new(path, 11, Utc::now() - Duration::hours(1)).with_checksum("remote-sum")
    } else {
        FileVersion::absent(path)
    };
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

#[tokio::test]
async fn keep_local_uploads_local_version() {
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "a.txt", b"local wins!").await;
    let provider = adapter();
    provider.put_file("/a.txt", b"remote text".to_vec(), None);

    let resolver = ConflictResolver::new(dir.path());
    let mut conflict = conflict_for(&local, ConflictType::ChecksumMismatch, true, true);
    let outcome = resolver
        .resolve(&mut conflict, Resolution::KeepLocal, &provider)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.action, ConflictAction::UploadedLocal);
    assert_eq!(provider.file_data("/a.txt").unwrap(), b"local wins!");
    assert!(conflict.is_resolved());
    assert_eq!(conflict.resolution(), Some(Resolution::KeepLocal));
}

#[tokio::test]
async fn keep_remote_overwrites_local_file() {
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "a.txt", b"local text!").await;
    let provider = adapter();
    provider.put_file("/a.txt", b"remote wins".to_vec(), None);

    let resolver = ConflictResolver::new(dir.path());
    let mut conflict = conflict_for(&local, ConflictType::ChecksumMismatch, true, true);
    let outcome = resolver
        .resolve(&mut conflict, Resolution::KeepRemote, &provider)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.action, ConflictAction::DownloadedRemote);
    assert_eq!(tokio::fs::read(&local).await.unwrap(), b"remote wins");
}

#[tokio::test]
async fn keep_remote_with_deleted_remote_removes_local() {
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "a.txt", b"local text!").await;
    let provider = adapter();

    let resolver = ConflictResolver::new(dir.path());
    let mut conflict = conflict_for(&local, ConflictType::DeletedRemote, true, false);
    let outcome = resolver
        .resolve(&mut conflict, Resolution::KeepRemote, &provider)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.action, ConflictAction::DeletedLocal);
    assert!(!local.exists());
}

#[tokio::test]
async fn keep_local_with_deleted_local_removes_remote() {
    let dir = TempDir::new().unwrap();
    let local = dir.path().join("a.txt");
    let provider = adapter();
    provider.put_file("/a.txt", b"remote text".to_vec(), None);

    let resolver = ConflictResolver::new(dir.path());
    let mut conflict = conflict_for(&local, ConflictType::DeletedLocal, false, true);
    let outcome = resolver
        .resolve(&mut conflict, Resolution::KeepLocal, &provider)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.action, ConflictAction::DeletedRemote);
    assert!(provider.file_data("/a.txt").is_none());
}

#[tokio::test]
async fn keep_both_forks_local_and_restores_remote() {
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "report.txt", b"local draft").await;
    let provider = adapter();
    provider.put_file("/report.txt", b"remote copy".to_vec(), None);

    let resolver = ConflictResolver::new(dir.path());
    let mut conflict = conflict_for(&local, ConflictType::ModifiedBoth, true, true);
    let outcome = resolver
        .resolve(&mut conflict, Resolution::KeepBoth, &provider)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.action, ConflictAction::KeptBoth);

    // Original path now holds the remote content
    assert_eq!(tokio::fs::read(&local).await.unwrap(), b"remote copy");

    // Exactly one conflict copy exists locally, carrying the local content
    let mut copies = Vec::new();
    let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
    while let Some(entry) = entries.next_entry().await.unwrap() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.contains("conflicted copy") {
            copies.push(entry.path());
        }
    }
    assert_eq!(copies.len(), 1);
    assert_eq!(tokio::fs::read(&copies[0]).await.unwrap(), b"local draft");

    // And the conflict copy was uploaded too
    let remote_files = provider.list_files(None, true).await.unwrap();
    assert_eq!(remote_files.len(), 2);
}

#[tokio::test]
async fn merge_reports_merged_action() {
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "notes.md", b"local notes").await;
    let provider = adapter();
    provider.put_file("/notes.md", b"remote note".to_vec(), None);

    let resolver = ConflictResolver::new(dir.path());
    let mut conflict = conflict_for(&local, ConflictType::ModifiedBoth, true, true);
    let outcome = resolver
        .resolve(&mut conflict, Resolution::Merge, &provider)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(outcome.action, ConflictAction::Merged);
}

#[tokio::test]
async fn manual_resolution_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "a.txt", b"local text!").await;
    let provider = adapter();
    provider.put_file("/a.txt", b"remote text".to_vec(), None);

    let resolver = ConflictResolver::new(dir.path());
    let mut conflict = conflict_for(&local, ConflictType::ChecksumMismatch, true, true);
    let outcome = resolver
        .resolve(&mut conflict, Resolution::Manual, &provider)
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(outcome.error.is_none());
    assert!(!conflict.is_resolved());
    assert_eq!(tokio::fs::read(&local).await.unwrap(), b"local text!");
    assert_eq!(provider.file_data("/a.txt").unwrap(), b"remote text");
}

#[tokio::test]
async fn resolving_twice_is_rejected() {
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "a.txt", b"local text!").await;
    let provider = adapter();
    provider.put_file("/a.txt", b"remote text".to_vec(), None);

    let resolver = ConflictResolver::new(dir.path());
    let mut conflict = conflict_for(&local, ConflictType::ChecksumMismatch, true, true);
    resolver
        .resolve(&mut conflict, Resolution::KeepLocal, &provider)
        .await
        .unwrap();

    let second = resolver
        .resolve(&mut conflict, Resolution::KeepRemote, &provider)
        .await;
    assert!(matches!(second, Err(ConflictError::AlreadyResolved(_))));
    assert_eq!(conflict.resolution(), Some(Resolution::KeepLocal));
}

#[tokio::test]
async fn failed_operation_leaves_conflict_unresolved() {
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "a.txt", b"local text!").await;
    let provider = adapter();
    provider.put_file("/a.txt", b"remote text".to_vec(), None);
    provider.inject_failures(vec![polysync_core::SyncError::Provider(
        "upload rejected".to_string(),
    )]);

    let resolver = ConflictResolver::new(dir.path());
    let mut conflict = conflict_for(&local, ConflictType::ChecksumMismatch, true, true);
    let outcome = resolver
        .resolve(&mut conflict, Resolution::KeepLocal, &provider)
        .await
        .unwrap();

    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap().contains("upload rejected"));
    assert!(!conflict.is_resolved());
}

#[tokio::test]
async fn batch_conservative_resolves_content_and_defers_deletions() {
    let dir = TempDir::new().unwrap();
    let a = write_local(&dir, "a.txt", b"local a").await;
    let b = dir.path().join("b.txt");
    let provider = adapter();
    provider.put_file("/a.txt", b"remote a".to_vec(), None);
    provider.put_file("/b.txt", b"remote b".to_vec(), None);

    let resolver = ConflictResolver::new(dir.path());
    let mut conflicts = vec![
        conflict_for(&a, ConflictType::ChecksumMismatch, true, true),
        conflict_for(&b, ConflictType::DeletedLocal, false, true),
    ];

    let outcomes = resolver
        .resolve_batch(&mut conflicts, AutoResolveStrategy::Conservative, &provider)
        .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes[0].success);
    assert_eq!(outcomes[0].action, ConflictAction::KeptBoth);
    assert!(!outcomes[1].success);
    assert_eq!(outcomes[1].action, ConflictAction::None);
    assert!(conflicts[0].is_resolved());
    assert!(!conflicts[1].is_resolved());
    // The deferred deletion left both sides untouched
    assert_eq!(provider.file_data("/b.txt").unwrap(), b"remote b");
}

#[tokio::test]
async fn detect_then_resolve_round_trip() {
    let dir = TempDir::new().unwrap();
    let local = write_local(&dir, "doc.txt", b"local edit!").await;
    let provider = adapter();
    provider.put_file(
        "/doc.txt",
        b"remote edit".to_vec(),
        Some("not-the-local-checksum".to_string()),
    );

    let detector = ConflictDetector::new(dir.path());
    let mut conflict = detector
        .detect_file(CloudProvider::Dropbox, &provider, &local)
        .await
        .unwrap()
        .expect("divergent versions should conflict");
    assert_eq!(conflict.conflict_type(), ConflictType::ChecksumMismatch);

    let resolver = ConflictResolver::new(dir.path());
    let outcome = resolver
        .resolve(&mut conflict, Resolution::KeepRemote, &provider)
        .await
        .unwrap();

    assert!(outcome.success);
    assert_eq!(tokio::fs::read(&local).await.unwrap(), b"remote edit");

    // With the remote version in place the tree is conflict-free again,
    // after a re-upload aligning the stored checksum
    provider.put_file("/doc.txt", b"remote edit".to_vec(), None);
    let remaining = detector
        .detect_tree(CloudProvider::Dropbox, &provider)
        .await
        .unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn detect_tree_reports_deletion_conflicts_both_ways() {
    let dir = TempDir::new().unwrap();
    write_local(&dir, "only-local.txt", b"fresh local").await;
    let provider = adapter();
    provider.put_file("/only-remote.txt", b"fresh remote".to_vec(), None);

    let detector = ConflictDetector::new(dir.path());
    let conflicts = detector
        .detect_tree(CloudProvider::Dropbox, &provider)
        .await
        .unwrap();

    let mut kinds: Vec<ConflictType> = conflicts.iter().map(|c| c.conflict_type()).collect();
    kinds.sort_by_key(|k| format!("{k}"));
    assert_eq!(
        kinds,
        vec![ConflictType::DeletedLocal, ConflictType::DeletedRemote]
    );
}

//! End-to-end orchestrator tests over the in-memory adapter

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use polysync_core::config::SyncConfig;
use polysync_core::domain::chunk::ChangeType;
use polysync_core::domain::conflict::Resolution;
use polysync_core::domain::errors::SyncError;
use polysync_core::domain::operation::OperationStatus;
use polysync_core::domain::provider::{CloudProvider, Platform, ProviderCredentials};
use polysync_core::domain::version::FileVersion;
use polysync_core::ports::connectivity::ConnectivityState;
use polysync_core::ports::memory::MemoryAdapter;
use polysync_core::ports::provider_adapter::ProviderAdapter;
use polysync_core::ports::version_history::{NullVersionHistory, VersionHistory};
use polysync_net::ManualConnectivityMonitor;
use polysync_queue::{QueuePool, SqliteQueueStore};
use polysync_core::domain::queue::RetryPolicy;
use polysync_service::{CloudSyncService, ProviderFactory, SyncDirection};

const PROVIDER: CloudProvider = CloudProvider::GoogleDrive;

struct Harness {
    _dir: TempDir,
    service: Arc<CloudSyncService>,
    memory: Arc<MemoryAdapter>,
    monitor: Arc<ManualConnectivityMonitor>,
}

impl Harness {
    fn local(&self, name: &str) -> std::path::PathBuf {
        self.service.sync_root().join(name)
    }

    fn write(&self, name: &str, data: &[u8]) -> std::path::PathBuf {
        let path = self.local(name);
        std::fs::write(&path, data).unwrap();
        path
    }
}

async fn harness_with(config: SyncConfig, history: Arc<dyn VersionHistory>) -> Harness {
    let dir = TempDir::new().unwrap();
    let memory = Arc::new(MemoryAdapter::new(PROVIDER));
    let factory = Arc::new(ProviderFactory::for_platform(Platform::Linux));
    let registered = memory.clone();
    factory.register(PROVIDER, move || {
        Ok(registered.clone() as Arc<dyn ProviderAdapter>)
    });

    let monitor = Arc::new(ManualConnectivityMonitor::online());
    let pool = QueuePool::in_memory().await.unwrap();
    let store = Arc::new(SqliteQueueStore::new(pool.pool().clone()));

    let service = CloudSyncService::new(
        dir.path(),
        config,
        factory,
        monitor.clone(),
        store,
        history,
    );
    let credentials = ProviderCredentials::new(PROVIDER)
        .with_field("access_token", "tok")
        .with_field("refresh_token", "refresh");
    assert!(service.connect_provider(&credentials).await.unwrap());

    Harness {
        _dir: dir,
        service,
        memory,
        monitor,
    }
}

async fn harness() -> Harness {
    harness_with(SyncConfig::default(), Arc::new(NullVersionHistory)).await
}

#[tokio::test]
async fn test_online_upload_completes_and_broadcasts() {
    let h = harness().await;
    let mut events = h.service.subscribe_operations();
    let path = h.write("a.txt", b"hello");

    let operation = h.service.upload(&path, PROVIDER).await.unwrap();
    assert_eq!(operation.status(), OperationStatus::Completed);
    assert_eq!(h.memory.file_data("/a.txt").unwrap(), b"hello");

    // Running, then Completed
    let first = events.recv().await.unwrap();
    assert_eq!(first.operation.status(), OperationStatus::Running);
    let second = events.recv().await.unwrap();
    assert_eq!(second.operation.status(), OperationStatus::Completed);
    assert_eq!(second.operation.id(), operation.id());
}

#[tokio::test]
async fn test_download_places_file_under_root() {
    let h = harness().await;
    h.memory.put_file("/docs/b.txt", b"remote".to_vec(), None);

    let operation = h.service.download("/docs/b.txt", PROVIDER).await.unwrap();
    assert_eq!(operation.status(), OperationStatus::Completed);
    assert_eq!(
        std::fs::read(h.service.sync_root().join("docs/b.txt")).unwrap(),
        b"remote"
    );
}

#[tokio::test]
async fn test_offline_upload_is_queued_then_drained() {
    let h = harness().await;
    h.monitor.set_state(ConnectivityState::Offline);
    let path = h.write("queued.txt", b"later");

    let operation = h.service.upload(&path, PROVIDER).await.unwrap();
    assert_eq!(operation.status(), OperationStatus::Queued);
    assert!(h.memory.file_data("/queued.txt").is_none());
    assert_eq!(h.service.queue_stats().await.unwrap().pending, 1);

    h.monitor.set_state(ConnectivityState::Online);
    let stats = h.service.process_offline_queue().await.unwrap();
    assert_eq!(stats.outstanding(), 0);
    assert_eq!(h.memory.file_data("/queued.txt").unwrap(), b"later");
}

#[tokio::test]
async fn test_offline_large_upload_survives_to_drain() {
    let h = harness().await;
    h.monitor.set_state(ConnectivityState::Offline);
    let payload = vec![0xA5u8; 10 * 1024 * 1024];
    let path = h.write("big.bin", &payload);

    h.service.upload(&path, PROVIDER).await.unwrap();
    assert!(h.memory.file_data("/big.bin").is_none());

    h.monitor.set_state(ConnectivityState::Online);
    h.service.process_offline_queue().await.unwrap();
    assert_eq!(h.memory.file_data("/big.bin").unwrap().len(), payload.len());
}

#[tokio::test]
async fn test_at_most_one_transfer_per_path() {
    let h = harness().await;
    h.memory.set_transfer_delay(Duration::from_millis(300));
    let path = h.write("busy.txt", b"contended");

    let service = h.service.clone();
    let contended = path.clone();
    let first = tokio::spawn(async move { service.upload(&contended, PROVIDER).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.service.active_transfers(), vec![path.clone()]);
    let err = h.service.upload(&path, PROVIDER).await.unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));

    let operation = first.await.unwrap().unwrap();
    assert_eq!(operation.status(), OperationStatus::Completed);
    assert!(h.service.active_transfers().is_empty());
}

#[tokio::test]
async fn test_queued_operation_fails_permanently_after_retries() {
    let h = harness().await;
    h.monitor.set_state(ConnectivityState::Offline);
    let path = h.write("doomed.txt", b"x");
    h.service.upload(&path, PROVIDER).await.unwrap();

    h.monitor.set_state(ConnectivityState::Online);
    // Each drain attempt pops one injected failure
    h.memory.inject_failures(vec![
        SyncError::Provider("boom".to_string()),
        SyncError::Provider("boom".to_string()),
        SyncError::Provider("boom".to_string()),
    ]);
    for _ in 0..3 {
        h.service.process_offline_queue().await.unwrap();
    }

    let stats = h.service.queue_stats().await.unwrap();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.pending + stats.retrying, 0);
}

#[tokio::test]
async fn test_cancelled_queued_operation_is_not_drained() {
    let h = harness().await;
    h.monitor.set_state(ConnectivityState::Offline);
    let path = h.write("c.txt", b"never sent");
    let operation = h.service.upload(&path, PROVIDER).await.unwrap();

    h.service.cancel_operation(operation.id()).await.unwrap();
    assert_eq!(
        h.service.operation(operation.id()).unwrap().status(),
        OperationStatus::Cancelled
    );

    h.monitor.set_state(ConnectivityState::Online);
    let stats = h.service.process_offline_queue().await.unwrap();
    assert!(h.memory.file_data("/c.txt").is_none());
    assert_eq!(stats.outstanding(), 0);
}

#[tokio::test]
async fn test_drain_holds_per_path_transfer_slot() {
    let h = harness().await;
    h.monitor.set_state(ConnectivityState::Offline);
    let path = h.write("held.txt", b"queued first");
    h.service.upload(&path, PROVIDER).await.unwrap();

    h.monitor.set_state(ConnectivityState::Online);
    h.memory.set_transfer_delay(Duration::from_millis(300));
    let service = h.service.clone();
    let drain = tokio::spawn(async move { service.process_offline_queue().await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    // The drained transfer owns the path; a direct submission is rejected
    let err = h.service.upload(&path, PROVIDER).await.unwrap_err();
    assert!(matches!(err, SyncError::Conflict(_)));

    drain.await.unwrap().unwrap();
    assert_eq!(h.memory.file_data("/held.txt").unwrap(), b"queued first");
    assert!(h.service.active_transfers().is_empty());
}

#[tokio::test]
async fn test_transient_exhaustion_leaves_operation_failed() {
    let config = SyncConfig {
        retry: RetryPolicy {
            max_retries: 2,
            base_delay_ms: 1,
            backoff_multiplier: 1.0,
            jitter: 0.0,
            breaker_failure_threshold: 10,
            breaker_cooldown_ms: 1_000,
        },
        ..SyncConfig::default()
    };
    let h = harness_with(config, Arc::new(NullVersionHistory)).await;
    let path = h.write("flaky.txt", b"x");
    h.memory.inject_failures(vec![
        SyncError::Provider("boom".to_string()),
        SyncError::Provider("boom".to_string()),
        SyncError::Provider("boom".to_string()),
    ]);

    let operation = h.service.upload(&path, PROVIDER).await.unwrap();
    assert_eq!(operation.status(), OperationStatus::Failed);
    assert_eq!(operation.retry_count(), 2);
    assert!(operation.error().is_some());
    // Exhaustion is final; nothing is parked for another round
    assert_eq!(h.service.queue_stats().await.unwrap().outstanding(), 0);
}

#[tokio::test]
async fn test_drain_failure_updates_operation_snapshot() {
    let h = harness().await;
    h.monitor.set_state(ConnectivityState::Offline);
    let path = h.write("lagging.txt", b"x");
    let operation = h.service.upload(&path, PROVIDER).await.unwrap();

    h.monitor.set_state(ConnectivityState::Online);
    h.memory
        .inject_failures(vec![SyncError::Provider("boom".to_string())]);
    h.service.process_offline_queue().await.unwrap();

    // One failed attempt: back to Queued with the retry counted
    let snapshot = h.service.operation(operation.id()).unwrap();
    assert_eq!(snapshot.status(), OperationStatus::Queued);
    assert_eq!(snapshot.retry_count(), 1);

    h.memory.inject_failures(vec![
        SyncError::Provider("boom".to_string()),
        SyncError::Provider("boom".to_string()),
    ]);
    for _ in 0..2 {
        h.service.process_offline_queue().await.unwrap();
    }

    let snapshot = h.service.operation(operation.id()).unwrap();
    assert_eq!(snapshot.status(), OperationStatus::Failed);
    assert!(snapshot.error().is_some());
}

#[tokio::test]
async fn test_conflict_detect_then_keep_local() {
    let h = harness().await;
    h.write("report.txt", b"local copy with substantially more content");
    h.memory.put_file("/report.txt", b"tiny".to_vec(), None);

    let found = h.service.check_for_conflicts(PROVIDER).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(h.service.pending_conflicts().len(), 1);

    let outcome = h
        .service
        .resolve_conflict(found[0].id(), Resolution::KeepLocal)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(
        h.memory.file_data("/report.txt").unwrap(),
        b"local copy with substantially more content"
    );
    assert!(h.service.pending_conflicts().is_empty());
}

struct RecordingHistory {
    entries: Mutex<Vec<(String, ChangeType)>>,
}

#[async_trait::async_trait]
impl VersionHistory for RecordingHistory {
    async fn record(
        &self,
        file_path: &str,
        _provider: CloudProvider,
        _version: &FileVersion,
        change_type: ChangeType,
    ) -> Result<(), SyncError> {
        self.entries
            .lock()
            .unwrap()
            .push((file_path.to_string(), change_type));
        Ok(())
    }
}

#[tokio::test]
async fn test_resolution_records_version_history() {
    let history = Arc::new(RecordingHistory {
        entries: Mutex::new(Vec::new()),
    });
    let h = harness_with(SyncConfig::default(), history.clone()).await;
    h.write("tracked.txt", b"local version is much longer than remote");
    h.memory.put_file("/tracked.txt", b"r".to_vec(), None);

    let found = h.service.check_for_conflicts(PROVIDER).await.unwrap();
    h.service
        .resolve_conflict(found[0].id(), Resolution::KeepLocal)
        .await
        .unwrap();

    let entries = history.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].0.ends_with("tracked.txt"));
    assert_eq!(entries[0].1, ChangeType::Modified);
}

#[tokio::test]
async fn test_sync_all_uploads_new_files_without_false_conflicts() {
    let h = harness().await;
    h.write("one.txt", b"first");
    h.write("two.txt", b"second");

    let report = h.service.sync_all(None, SyncDirection::Upload).await.unwrap();
    assert_eq!(report.files_synced, 2);
    assert_eq!(report.conflicts_detected, 0);
    assert!(report.errors.is_empty());
    assert_eq!(h.memory.file_data("/one.txt").unwrap(), b"first");
    assert_eq!(h.memory.file_data("/two.txt").unwrap(), b"second");
}

#[tokio::test]
async fn test_sync_all_auto_resolves_divergence_conservatively() {
    let h = harness().await;
    h.write("shared.txt", b"local draft with a fair amount of extra text");
    h.memory.put_file("/shared.txt", b"remote".to_vec(), None);

    let report = h.service.sync_all(None, SyncDirection::Upload).await.unwrap();
    assert_eq!(report.conflicts_detected, 1);
    assert_eq!(report.conflicts_resolved, 1);

    // Keep-both: the original path plus a conflict copy on the remote side
    let remote: Vec<String> = h
        .memory
        .list_files(None, true)
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .filter(|p| p.contains("shared"))
        .collect();
    assert_eq!(remote.len(), 2);
    assert!(remote.iter().any(|p| p.contains("conflicted copy")));
}

#[tokio::test]
async fn test_sync_all_download_direction_pulls_remote_files() {
    let h = harness().await;
    h.memory.put_file("/notes/a.txt", b"alpha".to_vec(), None);
    h.memory.put_file("/b.txt", b"beta".to_vec(), None);

    let report = h
        .service
        .sync_all(Some(PROVIDER), SyncDirection::Download)
        .await
        .unwrap();
    assert_eq!(report.files_synced, 2);
    assert_eq!(report.conflicts_detected, 0);
    assert!(report.errors.is_empty());
    assert_eq!(
        std::fs::read(h.service.sync_root().join("notes/a.txt")).unwrap(),
        b"alpha"
    );
    assert_eq!(std::fs::read(h.service.sync_root().join("b.txt")).unwrap(), b"beta");
}

#[tokio::test]
async fn test_sync_all_provider_filter_requires_connection() {
    let h = harness().await;
    h.write("solo.txt", b"only one provider");

    // The connected provider passes the filter
    let report = h
        .service
        .sync_all(Some(PROVIDER), SyncDirection::Upload)
        .await
        .unwrap();
    assert_eq!(report.files_synced, 1);

    // A provider that was never connected is an error, not a no-op
    let err = h
        .service
        .sync_all(Some(CloudProvider::Dropbox), SyncDirection::Upload)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
}

#[tokio::test]
async fn test_remote_only_file_surfaces_as_deleted_local_conflict() {
    let h = harness().await;
    h.memory.put_file("/orphan.txt", b"remote only".to_vec(), None);

    let report = h.service.sync_all(None, SyncDirection::Upload).await.unwrap();
    assert_eq!(report.conflicts_detected, 1);
    // Conservative strategy defers deletions to a person
    assert_eq!(report.conflicts_resolved, 0);
    let pending = h.service.pending_conflicts();
    assert_eq!(pending.len(), 1);

    let outcome = h
        .service
        .resolve_conflict(pending[0].id(), Resolution::KeepRemote)
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(
        std::fs::read(h.service.sync_root().join("orphan.txt")).unwrap(),
        b"remote only"
    );
}

#[tokio::test]
async fn test_connectivity_transition_triggers_debounced_drain() {
    let config = SyncConfig {
        auto_sync_interval_secs: 0,
        queue_drain_debounce_ms: 50,
        ..SyncConfig::default()
    };
    let h = harness_with(config, Arc::new(NullVersionHistory)).await;
    h.monitor.set_state(ConnectivityState::Offline);
    let path = h.write("auto.txt", b"drained");
    h.service.upload(&path, PROVIDER).await.unwrap();

    h.service.start().await;
    h.monitor.set_state(ConnectivityState::Online);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(h.memory.file_data("/auto.txt").unwrap(), b"drained");
    assert_eq!(h.service.queue_stats().await.unwrap().outstanding(), 0);
    h.service.shutdown().await;
}

#[tokio::test]
async fn test_pause_and_resume() {
    let h = harness().await;
    let mut status = h.service.subscribe_status();

    h.service.pause();
    assert!(h.service.is_paused());
    let event = status.recv().await.unwrap();
    assert_eq!(event.state, polysync_service::ServiceState::Paused);

    h.service.resume();
    assert!(!h.service.is_paused());
}

#[tokio::test]
async fn test_upload_requires_connected_or_queues() {
    let h = harness().await;
    h.service.disconnect_provider(PROVIDER).await.unwrap();
    let path = h.write("nowhere.txt", b"x");

    // Not connected: the operation is parked, not failed
    let operation = h.service.upload(&path, PROVIDER).await.unwrap();
    assert_eq!(operation.status(), OperationStatus::Queued);
    assert_eq!(h.service.queue_stats().await.unwrap().pending, 1);
}

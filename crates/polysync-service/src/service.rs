//! The cloud sync service
//!
//! [`CloudSyncService`] is the composition root: it owns the connected
//! adapters, tracks in-flight operations and pending conflicts, and wires
//! the chunk tracker, conflict detector/resolver, delta engine, offline
//! queue, and retry manager together. Hosts construct it explicitly and
//! call [`CloudSyncService::shutdown`] when done; there is no global
//! instance.
//!
//! Concurrency model: canonical state lives in dashmaps owned by the
//! service; observers only ever see cloned snapshots through the event
//! bus. At most one whole-file transfer runs per local path at a time.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use polysync_chunk::tracker::remote_path_for;
use polysync_chunk::{ChangeTracker, FileChunker};
use polysync_conflict::{AutoResolveStrategy, ConflictDetector, ConflictResolver};
use polysync_core::config::SyncConfig;
use polysync_core::domain::chunk::{ChangeType, FileChange};
use polysync_core::domain::conflict::{
    ConflictAction, ConflictType, Resolution, ResolutionOutcome, SyncConflict,
};
use polysync_core::domain::errors::SyncError;
use polysync_core::domain::operation::{OperationKind, OperationStatus, SyncOperation};
use polysync_core::domain::provider::{CloudProvider, ProviderCredentials};
use polysync_core::domain::queue::QueueStatus;
use polysync_core::ports::connectivity::{ConnectivityMonitor, ConnectivityState};
use polysync_core::ports::provider_adapter::ProviderAdapter;
use polysync_core::ports::queue_store::QueueStore;
use polysync_core::ports::version_history::VersionHistory;
use polysync_delta::{DeltaSyncEngine, SyncDirection};
use polysync_net::RetryManager;
use polysync_queue::{OfflineQueue, QueueStats};

use crate::events::{ConflictEvent, EventBus, OperationEvent, ServiceState, StatusEvent};
use crate::factory::ProviderFactory;

/// Summary of one full synchronization pass
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub files_synced: u32,
    pub files_deleted: u32,
    pub conflicts_detected: u32,
    pub conflicts_resolved: u32,
    pub bytes_transferred: u64,
    pub bytes_saved: u64,
    /// Non-fatal per-file errors; the pass continues past them
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// Releases the per-path transfer slot when the transfer ends
struct TransferGuard {
    active: Arc<DashMap<PathBuf, Uuid>>,
    path: PathBuf,
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        self.active.remove(&self.path);
    }
}

/// Orchestrates synchronization across all connected providers
pub struct CloudSyncService {
    sync_root: PathBuf,
    config: SyncConfig,
    factory: Arc<ProviderFactory>,
    monitor: Arc<dyn ConnectivityMonitor>,
    history: Arc<dyn VersionHistory>,

    providers: DashMap<CloudProvider, Arc<dyn ProviderAdapter>>,
    operations: DashMap<Uuid, SyncOperation>,
    conflicts: DashMap<Uuid, SyncConflict>,
    active: Arc<DashMap<PathBuf, Uuid>>,

    tracker: ChangeTracker,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    delta: DeltaSyncEngine,
    queue: OfflineQueue,
    retry: Arc<RetryManager>,
    events: EventBus,

    paused: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CloudSyncService {
    pub fn new(
        sync_root: impl Into<PathBuf>,
        config: SyncConfig,
        factory: Arc<ProviderFactory>,
        monitor: Arc<dyn ConnectivityMonitor>,
        store: Arc<dyn QueueStore>,
        history: Arc<dyn VersionHistory>,
    ) -> Arc<Self> {
        let sync_root = sync_root.into();
        let retry = Arc::new(RetryManager::new(monitor.clone(), config.retry.clone()));
        let queue = OfflineQueue::new(store, config.queue_max_retries);

        Arc::new(Self {
            tracker: ChangeTracker::new(config.chunk_size_override),
            detector: ConflictDetector::new(&sync_root),
            resolver: ConflictResolver::new(&sync_root),
            delta: DeltaSyncEngine::new(&sync_root),
            queue,
            retry,
            events: EventBus::new(),
            providers: DashMap::new(),
            operations: DashMap::new(),
            conflicts: DashMap::new(),
            active: Arc::new(DashMap::new()),
            paused: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
            sync_root,
            config,
            factory,
            monitor,
            history,
        })
    }

    pub fn sync_root(&self) -> &Path {
        &self.sync_root
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Event subscriptions
    // ------------------------------------------------------------------

    pub fn subscribe_status(&self) -> tokio::sync::broadcast::Receiver<StatusEvent> {
        self.events.subscribe_status()
    }

    pub fn subscribe_operations(&self) -> tokio::sync::broadcast::Receiver<OperationEvent> {
        self.events.subscribe_operations()
    }

    pub fn subscribe_conflicts(&self) -> tokio::sync::broadcast::Receiver<ConflictEvent> {
        self.events.subscribe_conflicts()
    }

    // ------------------------------------------------------------------
    // Provider lifecycle
    // ------------------------------------------------------------------

    /// Builds, initializes, and connects an adapter for the credentials'
    /// provider; returns false when the provider rejected them
    pub async fn connect_provider(
        &self,
        credentials: &ProviderCredentials,
    ) -> Result<bool, SyncError> {
        let provider = credentials.provider();
        let adapter = self.factory.create(credentials).await?;
        if !adapter.connect().await? {
            warn!(provider = %provider, "Provider rejected credentials");
            return Ok(false);
        }
        let mut provider_config = adapter.get_configuration().await;
        provider_config.simple_upload_threshold = self.config.large_file_threshold;
        adapter.update_configuration(provider_config).await?;
        self.providers.insert(provider, adapter);
        info!(provider = %provider, "Provider connected");
        self.events.publish_status(ServiceState::Idle, Some(provider));
        Ok(true)
    }

    pub async fn disconnect_provider(&self, provider: CloudProvider) -> Result<(), SyncError> {
        if let Some((_, adapter)) = self.providers.remove(&provider) {
            adapter.disconnect().await?;
            info!(provider = %provider, "Provider disconnected");
        }
        Ok(())
    }

    pub fn connected_providers(&self) -> Vec<CloudProvider> {
        self.providers.iter().map(|e| *e.key()).collect()
    }

    fn adapter(&self, provider: CloudProvider) -> Result<Arc<dyn ProviderAdapter>, SyncError> {
        self.providers
            .get(&provider)
            .map(|e| e.value().clone())
            .ok_or_else(|| {
                SyncError::Configuration(format!("provider {} is not connected", provider))
            })
    }

    // ------------------------------------------------------------------
    // File operations
    // ------------------------------------------------------------------

    /// Uploads a file under the sync root, queueing it when offline
    pub async fn upload(
        &self,
        local: &Path,
        provider: CloudProvider,
    ) -> Result<SyncOperation, SyncError> {
        let remote = remote_path_for(&self.sync_root, local)?;
        let operation =
            SyncOperation::new(OperationKind::Upload, local, remote, provider);
        self.submit(operation).await
    }

    /// Downloads a remote file to its place under the sync root
    pub async fn download(
        &self,
        remote: &str,
        provider: CloudProvider,
    ) -> Result<SyncOperation, SyncError> {
        let local = self.detector.local_path_for(remote);
        let operation =
            SyncOperation::new(OperationKind::Download, local, remote, provider);
        self.submit(operation).await
    }

    /// Propagates a local deletion to the remote side
    pub async fn delete(
        &self,
        local: &Path,
        provider: CloudProvider,
    ) -> Result<SyncOperation, SyncError> {
        let remote = remote_path_for(&self.sync_root, local)?;
        let operation =
            SyncOperation::new(OperationKind::Delete, local, remote, provider);
        self.submit(operation).await
    }

    /// Requests cancellation of an in-flight or queued operation
    ///
    /// A running operation stops at the next retry boundary; a provider
    /// call already on the wire runs to completion first. A queued
    /// operation is removed from the durable queue so a later drain
    /// cannot execute it.
    pub async fn cancel_operation(&self, operation_id: Uuid) -> Result<(), SyncError> {
        self.retry.cancel(operation_id);
        self.queue.remove(operation_id).await?;
        if let Some(mut entry) = self.operations.get_mut(&operation_id) {
            if entry.value_mut().cancel().is_ok() {
                self.events.publish_operation(entry.value());
            }
        }
        Ok(())
    }

    /// Snapshot of one operation by id
    pub fn operation(&self, operation_id: Uuid) -> Option<SyncOperation> {
        self.operations.get(&operation_id).map(|e| e.value().clone())
    }

    /// Local paths with a transfer currently in flight
    pub fn active_transfers(&self) -> Vec<PathBuf> {
        self.active.iter().map(|e| e.key().clone()).collect()
    }

    /// Routes an operation: immediate execution when the provider is
    /// reachable, offline queue otherwise
    async fn submit(&self, operation: SyncOperation) -> Result<SyncOperation, SyncError> {
        let guard = self.claim_path(&operation)?;

        if !self.providers.contains_key(&operation.provider())
            || !self.monitor.has_internet().await
        {
            drop(guard);
            return self.enqueue_offline(operation).await;
        }

        let adapter = self.adapter(operation.provider())?;
        let result = self.run_now(operation, adapter).await;
        drop(guard);
        result
    }

    /// Claims the per-path transfer slot
    fn claim_path(&self, operation: &SyncOperation) -> Result<TransferGuard, SyncError> {
        let path = operation.local_path().to_path_buf();
        match self.active.entry(path.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Err(SyncError::Conflict(format!(
                "transfer already in flight for {} (operation {})",
                path.display(),
                existing.get()
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(operation.id());
                Ok(TransferGuard {
                    active: self.active.clone(),
                    path,
                })
            }
        }
    }

    /// Parks an operation in the durable queue for later draining
    async fn enqueue_offline(
        &self,
        operation: SyncOperation,
    ) -> Result<SyncOperation, SyncError> {
        info!(
            operation_id = %operation.id(),
            kind = %operation.kind(),
            path = %operation.local_path().display(),
            "No connectivity, queueing operation"
        );
        self.queue.enqueue(operation.clone()).await?;
        self.operations.insert(operation.id(), operation.clone());
        self.events.publish_operation(&operation);
        if !self.monitor.has_internet().await {
            self.events
                .publish_status(ServiceState::Offline, Some(operation.provider()));
        }
        Ok(operation)
    }

    /// Executes an operation immediately through the retry manager
    async fn run_now(
        &self,
        mut operation: SyncOperation,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Result<SyncOperation, SyncError> {
        operation.start()?;
        self.operations.insert(operation.id(), operation.clone());
        self.events.publish_operation(&operation);

        let class = format!("{}:{}", operation.kind(), operation.provider());
        let retries = AtomicU32::new(0);
        let snapshot = operation.clone();
        let result = self
            .retry
            .execute_with_retry(
                operation.id(),
                &class,
                true,
                |_err, _attempt| {
                    retries.fetch_add(1, Ordering::SeqCst);
                },
                || {
                    let adapter = adapter.clone();
                    let op = snapshot.clone();
                    async move { perform(&op, adapter.as_ref()).await }
                },
            )
            .await;

        for _ in 0..retries.load(Ordering::SeqCst) {
            operation.record_retry();
        }

        match result {
            Ok(()) => {
                operation.complete()?;
            }
            Err(SyncError::Cancelled) => {
                operation.cancel()?;
            }
            Err(e) => {
                // The retry manager has already spent the attempt budget;
                // the operation stays Failed until someone retries it
                // explicitly.
                operation.fail(&e)?;
            }
        }

        self.operations.insert(operation.id(), operation.clone());
        self.events.publish_operation(&operation);
        Ok(operation)
    }

    // ------------------------------------------------------------------
    // Conflicts
    // ------------------------------------------------------------------

    /// Scans the tree against one provider, caching anything found as a
    /// pending conflict
    pub async fn check_for_conflicts(
        &self,
        provider: CloudProvider,
    ) -> Result<Vec<SyncConflict>, SyncError> {
        let adapter = self.adapter(provider)?;
        let found = self.detector.detect_tree(provider, adapter.as_ref()).await?;
        for conflict in &found {
            self.conflicts.insert(conflict.id(), conflict.clone());
            self.events.publish_conflict(conflict);
        }
        Ok(found)
    }

    /// Unresolved conflicts known to the service
    pub fn pending_conflicts(&self) -> Vec<SyncConflict> {
        self.conflicts.iter().map(|e| e.value().clone()).collect()
    }

    /// Applies a resolution to a cached conflict
    ///
    /// On success the version history records the surviving version, the
    /// conflict leaves the pending map, and a resolved snapshot is
    /// broadcast.
    pub async fn resolve_conflict(
        &self,
        conflict_id: Uuid,
        resolution: Resolution,
    ) -> Result<ResolutionOutcome, SyncError> {
        let mut conflict = self
            .conflicts
            .get(&conflict_id)
            .map(|e| e.value().clone())
            .ok_or_else(|| {
                SyncError::Conflict(format!("unknown conflict {}", conflict_id))
            })?;
        let adapter = self.adapter(conflict.provider())?;

        let outcome = self
            .resolver
            .resolve(&mut conflict, resolution, adapter.as_ref())
            .await
            .map_err(|e| SyncError::Conflict(e.to_string()))?;

        if outcome.success {
            self.record_resolution(&conflict, &outcome).await;
            self.conflicts.remove(&conflict_id);
            self.events.publish_conflict(&conflict);
        } else {
            // Failed or skipped; keep it pending with its current state
            self.conflicts.insert(conflict_id, conflict);
        }
        Ok(outcome)
    }

    async fn record_resolution(&self, conflict: &SyncConflict, outcome: &ResolutionOutcome) {
        let Some(version) = &outcome.resulting_version else {
            return;
        };
        let change_type = match outcome.action {
            ConflictAction::DeletedLocal | ConflictAction::DeletedRemote => ChangeType::Deleted,
            _ => ChangeType::Modified,
        };
        let path = conflict.file_path().to_string_lossy().to_string();
        if let Err(e) = self
            .history
            .record(&path, conflict.provider(), version, change_type)
            .await
        {
            warn!(conflict_id = %conflict.id(), error = %e, "Version history write failed");
        }
    }

    // ------------------------------------------------------------------
    // Full synchronization
    // ------------------------------------------------------------------

    /// One full pass over connected providers
    ///
    /// `provider` restricts the pass to one provider (all connected ones
    /// when `None`); `direction` decides which side is the source of
    /// truth. Conflicts are detected and conservatively auto-resolved
    /// first; paths still conflicted after that are skipped by the change
    /// sync so a divergent file is never half-transferred.
    pub async fn sync_all(
        &self,
        provider: Option<CloudProvider>,
        direction: SyncDirection,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let mut report = SyncReport::default();

        let providers: Vec<_> = match provider {
            Some(want) => vec![(want, self.adapter(want)?)],
            None => self
                .providers
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
        };

        self.events.publish_status(ServiceState::Syncing, provider);

        for (provider, adapter) in providers {
            if let Err(e) = self
                .sync_provider(provider, adapter.as_ref(), direction, &mut report)
                .await
            {
                warn!(provider = %provider, error = %e, "Provider sync pass failed");
                report.errors.push(format!("{}: {}", provider, e));
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            synced = report.files_synced,
            deleted = report.files_deleted,
            conflicts = report.conflicts_detected,
            resolved = report.conflicts_resolved,
            errors = report.errors.len(),
            duration_ms = report.duration_ms,
            "Sync pass complete"
        );
        self.events.publish_status(ServiceState::Idle, None);
        Ok(report)
    }

    async fn sync_provider(
        &self,
        provider: CloudProvider,
        adapter: &dyn ProviderAdapter,
        direction: SyncDirection,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let changes = match direction {
            SyncDirection::Upload => {
                self.tracker
                    .scan_directory(
                        &self.sync_root,
                        provider,
                        adapter,
                        true,
                        &self.config.scan_extensions,
                    )
                    .await?
            }
            SyncDirection::Download => self.scan_remote(provider, adapter).await?,
        };
        let created: HashSet<PathBuf> = changes
            .iter()
            .filter(|c| c.change_type == ChangeType::Created)
            .map(|c| c.file_path.clone())
            .collect();

        let mut found = self.detector.detect_tree(provider, adapter).await?;
        // A file that only exists on the source side and was just seen as
        // created is awaiting its first transfer, not a deletion on the
        // other side
        let superseded = match direction {
            SyncDirection::Upload => ConflictType::DeletedRemote,
            SyncDirection::Download => ConflictType::DeletedLocal,
        };
        found.retain(|c| {
            !(c.conflict_type() == superseded && created.contains(c.file_path()))
        });
        report.conflicts_detected += found.len() as u32;
        for conflict in &found {
            self.conflicts.insert(conflict.id(), conflict.clone());
            self.events.publish_conflict(conflict);
        }

        let outcomes = self
            .resolver
            .resolve_batch(&mut found, AutoResolveStrategy::Conservative, adapter)
            .await;
        for (conflict, outcome) in found.iter().zip(&outcomes) {
            if outcome.success {
                report.conflicts_resolved += 1;
                self.record_resolution(conflict, outcome).await;
                self.conflicts.remove(&conflict.id());
                self.events.publish_conflict(conflict);
            }
        }

        // Paths still conflicted are left alone until someone resolves them
        let blocked: HashSet<PathBuf> = found
            .iter()
            .filter(|c| !c.is_resolved())
            .map(|c| c.file_path().to_path_buf())
            .collect();

        for change in changes {
            if blocked.contains(&change.file_path) {
                debug!(
                    path = %change.file_path.display(),
                    "Skipping change on a conflicted path"
                );
                continue;
            }
            match self.apply_change(&change, direction, adapter).await {
                Ok((transferred, saved)) => {
                    if change.change_type == ChangeType::Deleted {
                        report.files_deleted += 1;
                    } else {
                        report.files_synced += 1;
                    }
                    report.bytes_transferred += transferred;
                    report.bytes_saved += saved;
                }
                Err(e) => {
                    report
                        .errors
                        .push(format!("{}: {}", change.file_path.display(), e));
                }
            }
        }
        Ok(())
    }

    async fn apply_change(
        &self,
        change: &FileChange,
        direction: SyncDirection,
        adapter: &dyn ProviderAdapter,
    ) -> Result<(u64, u64), SyncError> {
        let report = self.delta.sync_change(change, direction, adapter).await?;
        Ok((report.bytes_transferred, report.saved_bytes()))
    }

    /// Enumerates the remote tree, producing one change per file that is
    /// missing or differs locally
    ///
    /// Remote files absent locally come back as `Created`; the pass never
    /// deletes a local file on its own, divergent deletions surface as
    /// conflicts instead.
    async fn scan_remote(
        &self,
        provider: CloudProvider,
        adapter: &dyn ProviderAdapter,
    ) -> Result<Vec<FileChange>, SyncError> {
        let chunker = FileChunker::new();
        let mut changes = Vec::new();
        for entry in adapter.list_files(None, true).await? {
            if entry.is_directory {
                continue;
            }
            let local = self.detector.local_path_for(&entry.path);
            match tokio::fs::metadata(&local).await {
                Err(_) => {
                    changes.push(FileChange::new(
                        &local,
                        provider,
                        ChangeType::Created,
                        entry.size,
                    ));
                }
                Ok(meta) => {
                    let differs = if meta.len() != entry.size {
                        true
                    } else if let Some(remote_sum) = &entry.checksum {
                        chunker.checksum_file(&local).await? != *remote_sum
                    } else {
                        // Same size, no checksum to compare: leave it alone
                        false
                    };
                    if differs {
                        changes.push(FileChange::new(
                            &local,
                            provider,
                            ChangeType::Modified,
                            entry.size,
                        ));
                    }
                }
            }
        }
        debug!(
            provider = %provider,
            changes = changes.len(),
            "Remote scan complete"
        );
        Ok(changes)
    }

    // ------------------------------------------------------------------
    // Offline queue
    // ------------------------------------------------------------------

    /// Drains the offline queue in priority order
    ///
    /// Each entry gets one execution attempt per drain; failures move it
    /// through the queue's retry bookkeeping instead of blocking the rest.
    pub async fn process_offline_queue(&self) -> Result<QueueStats, SyncError> {
        if !self.monitor.has_internet().await {
            debug!("Drain requested without connectivity, skipping");
            return self.queue.stats().await;
        }

        self.events.publish_status(ServiceState::Draining, None);
        let pending = self.queue.pending_by_priority().await?;
        info!(entries = pending.len(), "Draining offline queue");

        for entry in pending {
            let operation = entry.operation;

            // A cancellation may have landed after this drain fetched the
            // pending list; a cancelled operation must never execute
            if self
                .operation(operation.id())
                .is_some_and(|op| op.status() == OperationStatus::Cancelled)
            {
                self.queue.remove(operation.id()).await?;
                continue;
            }

            // The drain competes with direct submissions for the per-path
            // slot; a busy path stays queued for the next drain
            let _guard = match self.claim_path(&operation) {
                Ok(guard) => guard,
                Err(_) => {
                    debug!(
                        operation_id = %operation.id(),
                        path = %operation.local_path().display(),
                        "Path busy, deferring queued operation"
                    );
                    continue;
                }
            };

            let adapter = match self.adapter(operation.provider()) {
                Ok(adapter) => adapter,
                Err(e) => {
                    self.fail_drained(&operation, &e).await?;
                    continue;
                }
            };

            match perform(&operation, adapter.as_ref()).await {
                Ok(()) => {
                    self.queue.complete(operation.id()).await?;
                    if let Some(mut snapshot) = self.operation(operation.id()) {
                        let _ = snapshot.start();
                        let _ = snapshot.complete();
                        self.operations.insert(snapshot.id(), snapshot.clone());
                        self.events.publish_operation(&snapshot);
                    }
                    debug!(operation_id = %operation.id(), "Queued operation completed");
                }
                Err(e) => {
                    warn!(
                        operation_id = %operation.id(),
                        error = %e,
                        "Queued operation failed"
                    );
                    self.fail_drained(&operation, &e).await?;
                }
            }
        }

        self.events.publish_status(ServiceState::Idle, None);
        self.queue.stats().await
    }

    /// Moves a drained entry through the queue's failure bookkeeping and
    /// mirrors the outcome onto the canonical operation snapshot
    async fn fail_drained(
        &self,
        operation: &SyncOperation,
        error: &SyncError,
    ) -> Result<(), SyncError> {
        self.queue.record_failure(operation.id(), error).await?;
        let exhausted = self
            .queue
            .get(operation.id())
            .await?
            .map(|q| q.status == QueueStatus::Failed)
            .unwrap_or(true);
        if let Some(mut snapshot) = self.operation(operation.id()) {
            let _ = snapshot.start();
            snapshot.record_retry();
            if exhausted {
                let _ = snapshot.fail(error);
            } else {
                let _ = snapshot.requeue();
            }
            self.operations.insert(snapshot.id(), snapshot.clone());
            self.events.publish_operation(&snapshot);
        }
        Ok(())
    }

    pub async fn queue_stats(&self) -> Result<QueueStats, SyncError> {
        self.queue.stats().await
    }

    // ------------------------------------------------------------------
    // Background tasks
    // ------------------------------------------------------------------

    /// Starts the auto-sync timer and the connectivity-driven queue
    /// drainer
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return;
        }

        if let Some(period) = self.config.auto_sync_interval() {
            let service = self.clone();
            tasks.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                // The first tick fires immediately; skip it
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if service.paused.load(Ordering::SeqCst) {
                        continue;
                    }
                    if let Err(e) = service.sync_all(None, SyncDirection::Upload).await {
                        warn!(error = %e, "Scheduled sync failed");
                    }
                }
            }));
        }

        let service = self.clone();
        // Subscribe before spawning so transitions right after start() are
        // not missed
        let mut events = self.monitor.subscribe();
        tasks.push(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ConnectivityState::Online) => {
                        // Debounce: links often flap right after coming up
                        tokio::time::sleep(service.config.queue_drain_debounce()).await;
                        if !service.monitor.has_internet().await {
                            continue;
                        }
                        if let Err(e) = service.process_offline_queue().await {
                            warn!(error = %e, "Queue drain failed");
                        }
                    }
                    Ok(_) => {}
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
        info!("Background tasks started");
    }

    /// Pauses scheduled syncs; in-flight work is not interrupted
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.events.publish_status(ServiceState::Paused, None);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.events.publish_status(ServiceState::Idle, None);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stops background tasks and disconnects every provider
    pub async fn shutdown(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        let providers: Vec<_> = self.providers.iter().map(|e| *e.key()).collect();
        for provider in providers {
            if let Err(e) = self.disconnect_provider(provider).await {
                warn!(provider = %provider, error = %e, "Disconnect failed during shutdown");
            }
        }
        info!("Service shut down");
    }
}

/// Executes one operation's provider call
async fn perform(
    operation: &SyncOperation,
    adapter: &dyn ProviderAdapter,
) -> Result<(), SyncError> {
    match operation.kind() {
        OperationKind::Upload => {
            adapter
                .upload_file(operation.local_path(), operation.remote_path())
                .await?;
            Ok(())
        }
        OperationKind::Download => {
            adapter
                .download_file(operation.remote_path(), operation.local_path())
                .await
        }
        OperationKind::Delete => {
            adapter.delete_file(operation.remote_path()).await?;
            Ok(())
        }
        OperationKind::Metadata => {
            adapter.get_metadata(operation.remote_path()).await?;
            Ok(())
        }
    }
}

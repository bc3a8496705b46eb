//! Priority-ordered offline queue
//!
//! Thin coordination layer over a [`QueueStore`]: status transitions,
//! priority adjustment, and the drain ordering guarantee. Drain order is
//! descending priority with FIFO ties, which determines fairness under
//! sustained offline periods; the ordering comes from the store query and
//! is re-asserted here after merging status buckets.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use polysync_core::domain::errors::SyncError;
use polysync_core::domain::operation::SyncOperation;
use polysync_core::domain::queue::{QueueStatus, QueuedOperation};
use polysync_core::ports::queue_store::QueueStore;

/// Point-in-time queue occupancy counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub pending: u64,
    pub retrying: u64,
    pub completed: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.retrying + self.completed + self.failed
    }

    /// Entries that a drain pass would still try to execute
    pub fn outstanding(&self) -> u64 {
        self.pending + self.retrying
    }
}

/// Holding area for operations that cannot run right now
pub struct OfflineQueue {
    store: Arc<dyn QueueStore>,
    max_retries: u32,
}

impl OfflineQueue {
    pub fn new(store: Arc<dyn QueueStore>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    /// Parks an operation for later execution
    ///
    /// Enqueueing an operation that is already queued is a no-op that
    /// returns the existing entry.
    pub async fn enqueue(&self, operation: SyncOperation) -> Result<QueuedOperation, SyncError> {
        if let Some(existing) = self.store.get(operation.id()).await? {
            debug!(operation_id = %operation.id(), "Operation already queued");
            return Ok(existing);
        }

        let entry = QueuedOperation::new(operation, self.max_retries);
        let stored = self.store.insert(entry).await?;
        info!(
            operation_id = %stored.operation.id(),
            kind = %stored.operation.kind(),
            priority = stored.priority,
            sequence = stored.sequence,
            "Operation queued"
        );
        Ok(stored)
    }

    /// Outstanding entries in drain order: priority descending, enqueue
    /// order within a priority band
    pub async fn pending_by_priority(&self) -> Result<Vec<QueuedOperation>, SyncError> {
        let mut entries = self.store.list_by_status(QueueStatus::Pending).await?;
        entries.extend(self.store.list_by_status(QueueStatus::Retrying).await?);
        entries.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.sequence.cmp(&b.sequence))
        });
        Ok(entries)
    }

    pub async fn get(&self, operation_id: Uuid) -> Result<Option<QueuedOperation>, SyncError> {
        self.store.get(operation_id).await
    }

    /// Entries that exhausted their retries
    pub async fn failed(&self) -> Result<Vec<QueuedOperation>, SyncError> {
        self.store.list_by_status(QueueStatus::Failed).await
    }

    /// Drops a successfully executed entry
    pub async fn complete(&self, operation_id: Uuid) -> Result<bool, SyncError> {
        let removed = self.store.remove(operation_id).await?;
        if removed {
            debug!(operation_id = %operation_id, "Queued operation completed");
        }
        Ok(removed)
    }

    /// Records a failed execution attempt
    ///
    /// The entry moves to `Retrying` while attempts remain and `Failed`
    /// once exhausted; failed entries stay in the store for inspection.
    pub async fn record_failure(
        &self,
        operation_id: Uuid,
        error: &SyncError,
    ) -> Result<Option<QueuedOperation>, SyncError> {
        let Some(mut entry) = self.store.get(operation_id).await? else {
            return Ok(None);
        };
        entry.record_failure(error.to_string());
        self.store.update(&entry).await?;

        if entry.status == QueueStatus::Failed {
            warn!(
                operation_id = %operation_id,
                retries = entry.retry_count,
                "Queued operation exhausted its retries"
            );
        }
        Ok(Some(entry))
    }

    /// Manually re-arms an entry, clearing its retry history
    pub async fn retry(&self, operation_id: Uuid) -> Result<bool, SyncError> {
        let Some(mut entry) = self.store.get(operation_id).await? else {
            return Ok(false);
        };
        entry.reset_for_retry();
        self.store.update(&entry).await?;
        info!(operation_id = %operation_id, "Queued operation re-armed for retry");
        Ok(true)
    }

    /// Removes an entry without executing it
    pub async fn remove(&self, operation_id: Uuid) -> Result<bool, SyncError> {
        self.store.remove(operation_id).await
    }

    /// Raises an entry's priority by one band
    pub async fn promote(&self, operation_id: Uuid) -> Result<Option<i32>, SyncError> {
        self.adjust_priority(operation_id, 1).await
    }

    /// Lowers an entry's priority by one band
    pub async fn demote(&self, operation_id: Uuid) -> Result<Option<i32>, SyncError> {
        self.adjust_priority(operation_id, -1).await
    }

    async fn adjust_priority(
        &self,
        operation_id: Uuid,
        delta: i32,
    ) -> Result<Option<i32>, SyncError> {
        let Some(mut entry) = self.store.get(operation_id).await? else {
            return Ok(None);
        };
        entry.priority = entry.priority.saturating_add(delta);
        self.store.update(&entry).await?;
        debug!(
            operation_id = %operation_id,
            priority = entry.priority,
            "Queue priority adjusted"
        );
        Ok(Some(entry.priority))
    }

    pub async fn stats(&self) -> Result<QueueStats, SyncError> {
        Ok(QueueStats {
            pending: self.store.count_by_status(QueueStatus::Pending).await?,
            retrying: self.store.count_by_status(QueueStatus::Retrying).await?,
            completed: self.store.count_by_status(QueueStatus::Completed).await?,
            failed: self.store.count_by_status(QueueStatus::Failed).await?,
        })
    }
}

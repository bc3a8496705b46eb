//! Durable queue storage port
//!
//! The offline queue must survive process restarts; losing a queued
//! operation silently would break the engine's delivery guarantee. This
//! port abstracts the durable store (SQLite in the shipped implementation,
//! anything transactional in principle).

use uuid::Uuid;

use crate::domain::errors::SyncError;
use crate::domain::queue::{QueueStatus, QueuedOperation};

/// Persistence surface for the offline queue
#[async_trait::async_trait]
pub trait QueueStore: Send + Sync {
    /// Persists a new entry, assigning its FIFO sequence; returns the
    /// stored entry
    async fn insert(&self, entry: QueuedOperation) -> Result<QueuedOperation, SyncError>;

    /// Updates an existing entry in place (status, retries, priority)
    async fn update(&self, entry: &QueuedOperation) -> Result<(), SyncError>;

    /// Removes an entry by operation id; `Ok(false)` when absent
    async fn remove(&self, operation_id: Uuid) -> Result<bool, SyncError>;

    /// Fetches one entry by operation id
    async fn get(&self, operation_id: Uuid) -> Result<Option<QueuedOperation>, SyncError>;

    /// All entries with the given status, ordered by priority descending
    /// then enqueue sequence ascending
    async fn list_by_status(
        &self,
        status: QueueStatus,
    ) -> Result<Vec<QueuedOperation>, SyncError>;

    /// Every entry in the store, in priority order
    async fn list_all(&self) -> Result<Vec<QueuedOperation>, SyncError>;

    /// Number of entries with the given status
    async fn count_by_status(&self, status: QueueStatus) -> Result<u64, SyncError>;
}

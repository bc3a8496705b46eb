//! Broadcast event streams
//!
//! Observers get cloned snapshots, never handles to canonical state. A
//! slow subscriber lags and drops old events; it cannot block the
//! orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use polysync_core::domain::conflict::SyncConflict;
use polysync_core::domain::operation::SyncOperation;
use polysync_core::domain::provider::CloudProvider;

const EVENT_BUFFER: usize = 256;

/// Coarse service-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Idle,
    Syncing,
    Draining,
    Paused,
    Offline,
}

/// Service status snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub state: ServiceState,
    /// The provider this status concerns, when scoped to one
    pub provider: Option<CloudProvider>,
    pub at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(state: ServiceState, provider: Option<CloudProvider>) -> Self {
        Self {
            state,
            provider,
            at: Utc::now(),
        }
    }
}

/// Snapshot of an operation after a lifecycle transition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationEvent {
    pub operation: SyncOperation,
}

/// Snapshot of a conflict, published on detection and on resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictEvent {
    pub conflict: SyncConflict,
}

/// The three orchestrator event streams
pub struct EventBus {
    status: broadcast::Sender<StatusEvent>,
    operations: broadcast::Sender<OperationEvent>,
    conflicts: broadcast::Sender<ConflictEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (status, _) = broadcast::channel(EVENT_BUFFER);
        let (operations, _) = broadcast::channel(EVENT_BUFFER);
        let (conflicts, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            status,
            operations,
            conflicts,
        }
    }

    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    pub fn subscribe_operations(&self) -> broadcast::Receiver<OperationEvent> {
        self.operations.subscribe()
    }

    pub fn subscribe_conflicts(&self) -> broadcast::Receiver<ConflictEvent> {
        self.conflicts.subscribe()
    }

    /// Publishes a status change; no subscribers is not an error
    pub fn publish_status(&self, state: ServiceState, provider: Option<CloudProvider>) {
        let _ = self.status.send(StatusEvent::new(state, provider));
    }

    pub fn publish_operation(&self, operation: &SyncOperation) {
        let _ = self.operations.send(OperationEvent {
            operation: operation.clone(),
        });
    }

    pub fn publish_conflict(&self, conflict: &SyncConflict) {
        let _ = self.conflicts.send(ConflictEvent {
            conflict: conflict.clone(),
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polysync_core::domain::operation::{OperationKind, SyncOperation};

    #[tokio::test]
    async fn test_subscribers_receive_snapshots() {
        let bus = EventBus::new();
        let mut status = bus.subscribe_status();
        let mut operations = bus.subscribe_operations();

        bus.publish_status(ServiceState::Syncing, Some(CloudProvider::Dropbox));
        let event = status.recv().await.unwrap();
        assert_eq!(event.state, ServiceState::Syncing);
        assert_eq!(event.provider, Some(CloudProvider::Dropbox));

        let op = SyncOperation::new(
            OperationKind::Upload,
            "/tmp/a.txt",
            "/a.txt",
            CloudProvider::Dropbox,
        );
        bus.publish_operation(&op);
        let event = operations.recv().await.unwrap();
        assert_eq!(event.operation.id(), op.id());
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::new();
        bus.publish_status(ServiceState::Idle, None);
    }
}

//! Cloud sync service orchestrator
//!
//! Composition layer over the engine crates: the provider factory builds
//! and initializes vendor adapters, the [`CloudSyncService`] owns the
//! connected-provider, active-operation, and pending-conflict maps, and
//! three broadcast streams publish immutable snapshots of status changes,
//! operation updates, and conflict notifications to host applications.

pub mod events;
pub mod factory;
pub mod service;

pub use events::{ConflictEvent, EventBus, OperationEvent, ServiceState, StatusEvent};
pub use factory::ProviderFactory;
pub use polysync_delta::SyncDirection;
pub use service::{CloudSyncService, SyncReport};

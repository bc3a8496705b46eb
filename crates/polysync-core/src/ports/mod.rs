//! Port definitions (trait interfaces for adapter crates)
//!
//! Ports are the only surface through which the engine touches the outside
//! world: cloud vendors, the network probe, durable queue storage, and the
//! external version-history store.

pub mod connectivity;
#[cfg(feature = "test-util")]
pub mod memory;
pub mod provider_adapter;
pub mod queue_store;
pub mod version_history;

pub use connectivity::{ConnectivityMonitor, ConnectivityState};
pub use provider_adapter::{
    ProviderAdapter, ProviderConfig, RemoteChange, RemoteEntry, StorageQuota,
};
pub use queue_store::QueueStore;
pub use version_history::VersionHistory;

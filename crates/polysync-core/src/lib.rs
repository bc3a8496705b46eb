//! Polysync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core of the sync engine:
//! - **Domain entities** - `SyncOperation`, `SyncConflict`, `FileVersion`,
//!   `FileChunk`, `FileChange`, `QueuedOperation`
//! - **Port definitions** - Traits implemented by adapter crates:
//!   `ProviderAdapter`, `ConnectivityMonitor`, `QueueStore`, `VersionHistory`
//! - **Error taxonomy** - `SyncError` with transient/permanent classification
//! - **Configuration** - `SyncConfig` consumed by the orchestrator
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O. Ports define
//! trait interfaces that adapter crates implement. The orchestrating service
//! composes domain entities through port interfaces only, so a cloud vendor
//! integration never leaks into this crate.

pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{
    chunk::{ChangeType, FileChange, FileChunk},
    conflict::{
        ConflictAction, ConflictSeverity, ConflictType, Resolution, ResolutionOutcome,
        SyncConflict,
    },
    errors::{ErrorKind, SyncError},
    operation::{OperationContext, OperationKind, OperationStatus, SyncOperation},
    provider::{CloudProvider, Platform, ProviderCredentials},
    queue::{QueueStatus, QueuedOperation, RetryPolicy},
    version::FileVersion,
};

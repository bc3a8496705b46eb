//! Delta/incremental sync engine
//!
//! Transfers one [`FileChange`](polysync_core::FileChange) at a time,
//! moving only the changed chunk subset when the change tracker produced
//! one and falling back to full-file transfer otherwise.

pub mod engine;

pub use engine::{DeltaSyncEngine, DeltaSyncProgress, DeltaSyncReport, SyncDirection};

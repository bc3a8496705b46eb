//! Durable offline operation queue
//!
//! Operations that cannot run (no connectivity) are parked here and
//! drained later in strict priority order. The queue survives process
//! restarts: entries live in SQLite through [`SqliteQueueStore`], and
//! exhausted operations are kept as `Failed` for inspection rather than
//! silently dropped.

pub mod error;
pub mod pool;
pub mod queue;
pub mod store;

pub use error::QueueError;
pub use pool::QueuePool;
pub use queue::{OfflineQueue, QueueStats};
pub use store::SqliteQueueStore;

//! Domain entities and value objects
//!
//! Pure business types with no I/O. Everything here is serde-serializable
//! so it can cross the queue persistence and event stream boundaries as
//! immutable snapshots.

pub mod chunk;
pub mod conflict;
pub mod errors;
pub mod operation;
pub mod provider;
pub mod queue;
pub mod version;

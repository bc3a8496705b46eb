//! Conflict detection and resolution
//!
//! The [`ConflictDetector`] is a state-free classifier over two
//! [`FileVersion`](polysync_core::FileVersion) snapshots; the
//! [`ConflictResolver`] applies a resolution policy by performing the
//! corresponding file operations through a provider adapter.

pub mod detector;
pub mod error;
pub mod namer;
pub mod resolver;

pub use detector::ConflictDetector;
pub use error::ConflictError;
pub use resolver::{AutoResolveStrategy, ConflictResolver};

//! Conflict crate error types

use thiserror::Error;

/// Errors specific to conflict handling
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The conflict was already resolved; resolutions apply exactly once
    #[error("conflict {0} is already resolved")]
    AlreadyResolved(String),

    /// The resolution's file operations failed
    #[error("resolution failed: {0}")]
    ResolutionFailed(String),

    /// The conflict references a file that no longer matches its recorded
    /// versions
    #[error("conflict is stale: {0}")]
    Stale(String),
}

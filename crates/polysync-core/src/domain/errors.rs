//! Error taxonomy for the sync engine
//!
//! Every failure surfaced by the engine carries a machine-checkable kind in
//! addition to a human-readable message. The retry layer uses
//! [`SyncError::is_transient`] to decide whether a failure is worth retrying
//! with backoff or should propagate immediately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-checkable classification of a sync failure
///
/// Mirrors the variants of [`SyncError`] without carrying the message,
/// suitable for embedding in persisted operations and event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NoNetwork,
    NoInternet,
    Authentication,
    Provider,
    QuotaExceeded,
    RateLimited,
    Integrity,
    Conflict,
    Configuration,
    Io,
    Cancelled,
    InvalidTransition,
}

/// Errors that can occur anywhere in the sync engine
///
/// Connectivity is split into two distinct conditions: `NoNetwork` means the
/// link itself is down, `NoInternet` means the link is up but true internet
/// reachability could not be verified. The offline queue treats both as
/// grounds for deferral; everything else is a real failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No network link available
    #[error("no network connection available")]
    NoNetwork,

    /// Link is up but internet reachability could not be verified
    #[error("network link up but internet is not reachable")]
    NoInternet,

    /// Expired or invalid credentials
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Vendor API failure that is not otherwise classified
    #[error("provider error: {0}")]
    Provider(String),

    /// Remote storage quota exhausted
    #[error("storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Provider requested throttling (HTTP 429 and equivalents)
    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    /// Checksum or size mismatch detected during reassembly/verification
    #[error("integrity check failed: {0}")]
    Integrity(String),

    /// Divergence that requires manual resolution
    #[error("unresolved conflict: {0}")]
    Conflict(String),

    /// Missing credentials, unsupported provider on this platform, adapter
    /// used before `initialize`
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Local filesystem failure
    #[error("I/O error: {0}")]
    Io(String),

    /// The operation was cancelled before completion
    #[error("operation cancelled")]
    Cancelled,

    /// Attempted an illegal status transition (programmer error)
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// The current status
        from: String,
        /// The attempted target status
        to: String,
    },
}

impl SyncError {
    /// Returns the machine-checkable kind for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::NoNetwork => ErrorKind::NoNetwork,
            SyncError::NoInternet => ErrorKind::NoInternet,
            SyncError::Authentication(_) => ErrorKind::Authentication,
            SyncError::Provider(_) => ErrorKind::Provider,
            SyncError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
            SyncError::RateLimited(_) => ErrorKind::RateLimited,
            SyncError::Integrity(_) => ErrorKind::Integrity,
            SyncError::Conflict(_) => ErrorKind::Conflict,
            SyncError::Configuration(_) => ErrorKind::Configuration,
            SyncError::Io(_) => ErrorKind::Io,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
        }
    }

    /// Returns true if retrying this error with backoff is worthwhile
    ///
    /// Connectivity blips, rate limiting, and unclassified provider failures
    /// are transient. Bad credentials, integrity failures, conflicts, and
    /// configuration errors are not: retrying them cannot succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::NoNetwork
                | SyncError::NoInternet
                | SyncError::RateLimited(_)
                | SyncError::Provider(_)
        )
    }

    /// Returns true if this error is a connectivity condition rather than a
    /// real failure (the offline queue defers on these instead of counting
    /// a retry attempt)
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SyncError::NoNetwork | SyncError::NoInternet)
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

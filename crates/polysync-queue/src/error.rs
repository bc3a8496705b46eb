//! Queue-local error types

use polysync_core::SyncError;
use thiserror::Error;

/// Failures inside the durable queue layer
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("schema migration failed: {0}")]
    MigrationFailed(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("stored entry is corrupt: {0}")]
    Serialization(String),
}

impl From<QueueError> for SyncError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::ConnectionFailed(m) | QueueError::MigrationFailed(m) => {
                SyncError::Configuration(m)
            }
            QueueError::Query(m) | QueueError::Serialization(m) => SyncError::Io(m),
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Query(e.to_string())
    }
}

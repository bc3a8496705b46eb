//! Queue database pool
//!
//! Wraps SQLx's SqlitePool with directory creation, WAL journal mode,
//! schema migration on first connection, and an in-memory mode for tests.

use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use crate::error::QueueError;

/// SQLite connection pool for the offline queue
///
/// File-backed pools use WAL journal mode and a 5-second busy timeout to
/// handle write contention. In-memory pools use a single connection,
/// because an SQLite in-memory database is per-connection.
pub struct QueuePool {
    pool: SqlitePool,
}

impl QueuePool {
    /// Opens (creating if missing) the queue database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self, QueueError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                QueueError::ConnectionFailed(format!(
                    "cannot create queue directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                QueueError::ConnectionFailed(format!(
                    "cannot open queue database {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::run_migrations(&pool).await?;

        info!(path = %db_path.display(), "Queue database opened");
        Ok(Self { pool })
    }

    /// Creates an in-memory queue database for tests
    pub async fn in_memory() -> Result<Self, QueueError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                QueueError::ConnectionFailed(format!("cannot create in-memory database: {}", e))
            })?;

        Self::run_migrations(&pool).await?;

        debug!("In-memory queue database opened");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), QueueError> {
        let migration_sql = include_str!("migrations/20260815_initial.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| QueueError::MigrationFailed(e.to_string()))?;

        debug!("Queue schema migrations completed");
        Ok(())
    }
}

//! SQLite implementation of the queue store port
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                              |
//! |-----------------|----------|---------------------------------------|
//! | operation id    | TEXT     | UUID string                           |
//! | SyncOperation   | TEXT     | serde_json serialization              |
//! | QueueStatus     | TEXT     | plain string ("pending", "failed"...) |
//! | DateTime<Utc>   | TEXT     | ISO 8601 via `to_rfc3339()`           |
//! | sequence        | INTEGER  | SQLite AUTOINCREMENT rowid            |

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use polysync_core::domain::errors::SyncError;
use polysync_core::domain::queue::{QueueStatus, QueuedOperation};
use polysync_core::ports::queue_store::QueueStore;

use crate::error::QueueError;

/// Durable queue storage backed by SQLite
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Creates a store over an already-migrated connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn status_from_string(s: &str) -> Result<QueueStatus, QueueError> {
    match s {
        "pending" => Ok(QueueStatus::Pending),
        "retrying" => Ok(QueueStatus::Retrying),
        "completed" => Ok(QueueStatus::Completed),
        "failed" => Ok(QueueStatus::Failed),
        other => Err(QueueError::Serialization(format!(
            "unknown queue status: {}",
            other
        ))),
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<QueuedOperation, QueueError> {
    let operation_json: String = row.get("operation");
    let operation = serde_json::from_str(&operation_json)
        .map_err(|e| QueueError::Serialization(format!("operation payload: {}", e)))?;

    let status: String = row.get("status");
    let enqueued_at: String = row.get("enqueued_at");
    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
        .map_err(|e| QueueError::Serialization(format!("enqueued_at: {}", e)))?
        .with_timezone(&Utc);

    Ok(QueuedOperation {
        operation,
        status: status_from_string(&status)?,
        retry_count: row.get::<i64, _>("retry_count") as u32,
        max_retries: row.get::<i64, _>("max_retries") as u32,
        priority: row.get::<i64, _>("priority") as i32,
        error_message: row.get("error_message"),
        enqueued_at,
        sequence: row.get("sequence"),
    })
}

#[async_trait::async_trait]
impl QueueStore for SqliteQueueStore {
    async fn insert(&self, mut entry: QueuedOperation) -> Result<QueuedOperation, SyncError> {
        let operation_json = serde_json::to_string(&entry.operation)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        let result = sqlx::query(
            r#"
            INSERT INTO queue_entries
                (operation_id, operation, status, retry_count, max_retries,
                 priority, error_message, enqueued_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.operation.id().to_string())
        .bind(&operation_json)
        .bind(entry.status.to_string())
        .bind(entry.retry_count as i64)
        .bind(entry.max_retries as i64)
        .bind(entry.priority as i64)
        .bind(&entry.error_message)
        .bind(entry.enqueued_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(QueueError::from)?;

        entry.sequence = result.last_insert_rowid();
        Ok(entry)
    }

    async fn update(&self, entry: &QueuedOperation) -> Result<(), SyncError> {
        let operation_json = serde_json::to_string(&entry.operation)
            .map_err(|e| QueueError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE queue_entries
            SET operation = ?, status = ?, retry_count = ?, priority = ?,
                error_message = ?
            WHERE operation_id = ?
            "#,
        )
        .bind(&operation_json)
        .bind(entry.status.to_string())
        .bind(entry.retry_count as i64)
        .bind(entry.priority as i64)
        .bind(&entry.error_message)
        .bind(entry.operation.id().to_string())
        .execute(&self.pool)
        .await
        .map_err(QueueError::from)?;

        Ok(())
    }

    async fn remove(&self, operation_id: Uuid) -> Result<bool, SyncError> {
        let result = sqlx::query("DELETE FROM queue_entries WHERE operation_id = ?")
            .bind(operation_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(QueueError::from)?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, operation_id: Uuid) -> Result<Option<QueuedOperation>, SyncError> {
        let row = sqlx::query("SELECT * FROM queue_entries WHERE operation_id = ?")
            .bind(operation_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(QueueError::from)?;

        match row {
            Some(row) => Ok(Some(row_to_entry(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_status(
        &self,
        status: QueueStatus,
    ) -> Result<Vec<QueuedOperation>, SyncError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM queue_entries
            WHERE status = ?
            ORDER BY priority DESC, sequence ASC
            "#,
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(QueueError::from)?;

        rows.iter()
            .map(|row| row_to_entry(row).map_err(SyncError::from))
            .collect()
    }

    async fn list_all(&self) -> Result<Vec<QueuedOperation>, SyncError> {
        let rows =
            sqlx::query("SELECT * FROM queue_entries ORDER BY priority DESC, sequence ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(QueueError::from)?;

        rows.iter()
            .map(|row| row_to_entry(row).map_err(SyncError::from))
            .collect()
    }

    async fn count_by_status(&self, status: QueueStatus) -> Result<u64, SyncError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM queue_entries WHERE status = ?")
            .bind(status.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(QueueError::from)?;
        Ok(row.get::<i64, _>("n") as u64)
    }
}

//! Sync operations
//!
//! A [`SyncOperation`] is the unit of work the orchestrator creates for
//! every upload/download/delete request. Its status moves through a strict
//! lifecycle; illegal transitions are rejected so that two actors can never
//! disagree about where an operation is.
//!
//! ```text
//! Queued ──→ Running ──→ Completed
//!   │           │   └───→ Failed
//!   │           └───────→ Cancelled
//!   ├───────────────────→ Cancelled
//!   └───→ Queued (re-queue after a deferred attempt)
//! Failed ──→ Queued (manual retry)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::errors::{ErrorKind, SyncError};
use super::provider::CloudProvider;

/// What kind of work an operation performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Upload,
    Download,
    Delete,
    Metadata,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationKind::Upload => "upload",
            OperationKind::Download => "download",
            OperationKind::Delete => "delete",
            OperationKind::Metadata => "metadata",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle status of a sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    /// Returns true if no further transitions are allowed from this status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OperationStatus::Completed | OperationStatus::Failed | OperationStatus::Cancelled
        )
    }

    /// Returns true if the operation may still be cancelled
    pub fn is_cancellable(&self) -> bool {
        matches!(self, OperationStatus::Queued | OperationStatus::Running)
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationStatus::Queued => "queued",
            OperationStatus::Running => "running",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
            OperationStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Typed context attached to an operation
///
/// Where the shape of the metadata is known the variant is explicit; only
/// genuinely provider-specific passthrough goes into the `Extras` bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperationContext {
    /// No additional context
    None,
    /// Created while executing a conflict resolution
    ConflictResolution {
        conflict_id: Uuid,
        resolution: String,
    },
    /// Created from a detected change during a full sync pass
    ChangeSync { change_type: String },
    /// Opaque provider-specific key-value extras
    Extras(serde_json::Map<String, serde_json::Value>),
}

impl Default for OperationContext {
    fn default() -> Self {
        OperationContext::None
    }
}

/// A unit of sync work with a strictly ordered status lifecycle
///
/// The orchestrator is the sole writer; observers receive cloned snapshots
/// through the event stream, never a handle to the canonical instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOperation {
    id: Uuid,
    kind: OperationKind,
    local_path: PathBuf,
    remote_path: String,
    provider: CloudProvider,
    status: OperationStatus,
    created_at: DateTime<Utc>,
    queued_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    /// Higher value means more urgent
    priority: i32,
    retry_count: u32,
    error: Option<String>,
    error_kind: Option<ErrorKind>,
    progress_percentage: f64,
    #[serde(default)]
    context: OperationContext,
}

impl SyncOperation {
    /// Creates a new operation in `Queued` status
    pub fn new(
        kind: OperationKind,
        local_path: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        provider: CloudProvider,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            local_path: local_path.into(),
            remote_path: remote_path.into(),
            provider,
            status: OperationStatus::Queued,
            created_at: now,
            queued_at: Some(now),
            started_at: None,
            completed_at: None,
            priority: 0,
            retry_count: 0,
            error: None,
            error_kind: None,
            progress_percentage: 0.0,
            context: OperationContext::None,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_context(mut self, context: OperationContext) -> Self {
        self.context = context;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    pub fn provider(&self) -> CloudProvider {
        self.provider
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn queued_at(&self) -> Option<DateTime<Utc>> {
        self.queued_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn progress(&self) -> f64 {
        self.progress_percentage
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    fn invalid(&self, to: OperationStatus) -> SyncError {
        SyncError::InvalidTransition {
            from: self.status.to_string(),
            to: to.to_string(),
        }
    }

    /// Marks the operation as running
    pub fn start(&mut self) -> Result<(), SyncError> {
        if self.status != OperationStatus::Queued {
            return Err(self.invalid(OperationStatus::Running));
        }
        self.status = OperationStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Marks a running operation as completed
    pub fn complete(&mut self) -> Result<(), SyncError> {
        if self.status != OperationStatus::Running {
            return Err(self.invalid(OperationStatus::Completed));
        }
        self.status = OperationStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.progress_percentage = 100.0;
        Ok(())
    }

    /// Marks a running operation as failed, recording the classified error
    pub fn fail(&mut self, error: &SyncError) -> Result<(), SyncError> {
        if self.status != OperationStatus::Running {
            return Err(self.invalid(OperationStatus::Failed));
        }
        self.status = OperationStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error = Some(error.to_string());
        self.error_kind = Some(error.kind());
        Ok(())
    }

    /// Cancels the operation if it is still cancellable
    pub fn cancel(&mut self) -> Result<(), SyncError> {
        if !self.status.is_cancellable() {
            return Err(self.invalid(OperationStatus::Cancelled));
        }
        self.status = OperationStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Returns a failed operation to the queue for another attempt
    ///
    /// Also used when a running attempt was deferred for lack of
    /// connectivity: the operation goes back to `Queued` without counting
    /// an attempt.
    pub fn requeue(&mut self) -> Result<(), SyncError> {
        if !matches!(
            self.status,
            OperationStatus::Failed | OperationStatus::Running
        ) {
            return Err(self.invalid(OperationStatus::Queued));
        }
        self.status = OperationStatus::Queued;
        self.queued_at = Some(Utc::now());
        self.error = None;
        self.error_kind = None;
        Ok(())
    }

    /// Increments the retry counter before a retry attempt
    pub fn record_retry(&mut self) {
        self.retry_count += 1;
    }

    /// Updates transfer progress, clamped to `[0, 100]`
    pub fn set_progress(&mut self, percentage: f64) {
        self.progress_percentage = percentage.clamp(0.0, 100.0);
    }
}

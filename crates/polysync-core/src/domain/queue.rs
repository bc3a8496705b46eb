//! Offline queue entries and retry policy
//!
//! [`QueuedOperation`] wraps a [`SyncOperation`] for durable storage while
//! connectivity is absent. [`RetryPolicy`] is the declarative retry/backoff
//! configuration consumed by the retry manager; per-attempt mutable state
//! lives with the manager, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::operation::SyncOperation;

/// Status of an operation held in the offline queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    /// Waiting for the next drain pass
    Pending,
    /// Failed at least once, waiting to be retried
    Retrying,
    /// Executed successfully (kept briefly for bookkeeping, then removed)
    Completed,
    /// Exhausted its retries; kept for inspection, never silently dropped
    Failed,
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Retrying => "retrying",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// A sync operation held durably while it cannot execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub operation: SyncOperation,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    /// Copied from the operation at enqueue time; promote/demote act here
    pub priority: i32,
    pub error_message: Option<String>,
    pub enqueued_at: DateTime<Utc>,
    /// Monotonic enqueue sequence, assigned by the store; breaks priority
    /// ties FIFO
    #[serde(default)]
    pub sequence: i64,
}

impl QueuedOperation {
    pub fn new(operation: SyncOperation, max_retries: u32) -> Self {
        let priority = operation.priority();
        Self {
            operation,
            status: QueueStatus::Pending,
            retry_count: 0,
            max_retries,
            priority,
            error_message: None,
            enqueued_at: Utc::now(),
            sequence: 0,
        }
    }

    /// Returns true if another retry attempt is allowed
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Records a failed execution attempt
    ///
    /// Transitions to `Retrying` while attempts remain, `Failed` once
    /// exhausted.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.error_message = Some(error.into());
        self.status = if self.can_retry() {
            QueueStatus::Retrying
        } else {
            QueueStatus::Failed
        };
    }

    /// Resets a failed entry for a manual retry
    pub fn reset_for_retry(&mut self) {
        self.retry_count = 0;
        self.error_message = None;
        self.status = QueueStatus::Pending;
    }
}

/// Declarative retry and circuit-breaker configuration
///
/// Pure data with no behavior; the retry manager interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retry attempts after the initial try
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub base_delay_ms: u64,
    /// Geometric growth factor per attempt
    pub backoff_multiplier: f64,
    /// Maximum fraction of the computed delay added as random jitter
    pub jitter: f64,
    /// Consecutive failures before the circuit opens
    pub breaker_failure_threshold: u32,
    /// How long an open circuit waits before half-opening, in milliseconds
    pub breaker_cooldown_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1_000,
            backoff_multiplier: 2.0,
            jitter: 0.25,
            breaker_failure_threshold: 5,
            breaker_cooldown_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Computes the backoff delay before the given attempt (0-based),
    /// without jitter
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis =
            self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis as u64)
    }

    pub fn breaker_cooldown(&self) -> Duration {
        Duration::from_millis(self.breaker_cooldown_ms)
    }
}

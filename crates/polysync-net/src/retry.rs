//! Generic retry executor
//!
//! Runs a fallible async operation under a [`RetryPolicy`]: exponential
//! backoff with random jitter, retrying only transient errors. Operations
//! that require connectivity are deferred while the network is down, and a
//! deferral does not consume a retry attempt. Failures feed a per-class
//! circuit breaker so a misbehaving provider fails fast instead of
//! hammering the network. In-flight operations can be cancelled by id;
//! cancellation is checked before every attempt and before every backoff
//! wait.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use polysync_core::domain::errors::SyncError;
use polysync_core::domain::queue::RetryPolicy;
use polysync_core::ports::connectivity::ConnectivityMonitor;

use crate::breaker::CircuitBreaker;

/// How long one connectivity-deferral wait lasts before re-checking
const DEFER_RECHECK: Duration = Duration::from_secs(5);

/// Retry executor with connectivity deferral and circuit breaking
pub struct RetryManager {
    monitor: Arc<dyn ConnectivityMonitor>,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    cancelled: DashMap<Uuid, ()>,
    policy: RetryPolicy,
}

impl RetryManager {
    pub fn new(monitor: Arc<dyn ConnectivityMonitor>, policy: RetryPolicy) -> Self {
        Self {
            monitor,
            breakers: DashMap::new(),
            cancelled: DashMap::new(),
            policy,
        }
    }

    /// The policy this manager executes under
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Requests cancellation of an in-flight operation
    ///
    /// Takes effect at the next attempt or backoff boundary.
    pub fn cancel(&self, operation_id: Uuid) {
        self.cancelled.insert(operation_id, ());
    }

    /// Executes `operation` with retries under the manager's policy
    ///
    /// `class` names the logical operation class for circuit breaking
    /// (e.g. "upload:google_drive"). `on_retry` runs before each retry
    /// with the error and the 1-based attempt number about to start, so
    /// callers can surface retry state.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        operation_id: Uuid,
        class: &str,
        requires_connectivity: bool,
        mut on_retry: impl FnMut(&SyncError, u32),
        mut operation: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let breaker = self.breaker_for(class);
        let result = self
            .run(
                operation_id,
                class,
                &breaker,
                requires_connectivity,
                &mut on_retry,
                &mut operation,
            )
            .await;
        self.cancelled.remove(&operation_id);
        result
    }

    async fn run<T, F, Fut>(
        &self,
        operation_id: Uuid,
        class: &str,
        breaker: &CircuitBreaker,
        requires_connectivity: bool,
        on_retry: &mut impl FnMut(&SyncError, u32),
        operation: &mut F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            self.check_cancelled(operation_id)?;

            if requires_connectivity && !self.monitor.has_internet().await {
                // Deferral, not failure: wait for connectivity without
                // consuming an attempt
                debug!(
                    operation_id = %operation_id,
                    class,
                    "No connectivity, deferring attempt"
                );
                self.wait_for_connectivity(operation_id).await?;
                continue;
            }

            if !breaker.try_acquire() {
                warn!(operation_id = %operation_id, class, "Circuit open, failing fast");
                return Err(SyncError::Provider(format!(
                    "circuit open for {class}, cooling down"
                )));
            }

            match operation().await {
                Ok(value) => {
                    breaker.on_success();
                    if attempt > 0 {
                        info!(
                            operation_id = %operation_id,
                            class,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    breaker.on_failure();

                    if !e.is_transient() {
                        debug!(
                            operation_id = %operation_id,
                            class,
                            error = %e,
                            "Non-transient error, not retrying"
                        );
                        return Err(e);
                    }
                    if attempt >= self.policy.max_retries {
                        warn!(
                            operation_id = %operation_id,
                            class,
                            attempts = attempt + 1,
                            error = %e,
                            "Retries exhausted"
                        );
                        return Err(e);
                    }

                    let delay = self.jittered_delay(attempt);
                    attempt += 1;
                    on_retry(&e, attempt);
                    debug!(
                        operation_id = %operation_id,
                        class,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Backing off before retry"
                    );

                    self.check_cancelled(operation_id)?;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Blocks until the monitor reports internet reachability
    async fn wait_for_connectivity(&self, operation_id: Uuid) -> Result<(), SyncError> {
        let mut events = self.monitor.subscribe();
        loop {
            self.check_cancelled(operation_id)?;
            // Wake on a state event or re-probe after a fixed wait; events
            // may flap, so reachability is always re-verified
            let _ = timeout(DEFER_RECHECK, events.recv()).await;
            if self.monitor.has_internet().await {
                return Ok(());
            }
        }
    }

    fn check_cancelled(&self, operation_id: Uuid) -> Result<(), SyncError> {
        if self.cancelled.contains_key(&operation_id) {
            info!(operation_id = %operation_id, "Operation cancelled");
            return Err(SyncError::Cancelled);
        }
        Ok(())
    }

    /// Backoff delay for the given 0-based attempt, plus random jitter
    fn jittered_delay(&self, attempt: u32) -> Duration {
        let base = self.policy.delay_for_attempt(attempt);
        if self.policy.jitter <= 0.0 {
            return base;
        }
        let span = base.as_millis() as f64 * self.policy.jitter;
        let extra = rand::thread_rng().gen_range(0.0..=span);
        base + Duration::from_millis(extra as u64)
    }

    fn breaker_for(&self, class: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(class.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    self.policy.breaker_failure_threshold,
                    self.policy.breaker_cooldown(),
                ))
            })
            .clone()
    }

    /// Breaker state for one class, for diagnostics
    pub fn breaker_state(&self, class: &str) -> Option<crate::breaker::BreakerState> {
        self.breakers.get(class).map(|b| b.state())
    }
}

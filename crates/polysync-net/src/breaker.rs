//! Circuit breaker per logical operation class
//!
//! Tracks consecutive failures; once the threshold is reached the circuit
//! opens and calls fail fast without touching the provider. After a
//! cooldown window the circuit half-opens and lets a single probe through:
//! success closes it, failure re-opens it for another cooldown.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

/// Observable breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls pass through normally
    Closed,
    /// Calls fail fast until the cooldown elapses
    Open,
    /// One probe call is allowed through
    HalfOpen,
}

struct BreakerInner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Returns true if a call may proceed
    ///
    /// An open circuit whose cooldown has elapsed transitions to half-open
    /// and admits the caller as the probe.
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.cooldown);
                if cooled {
                    debug!("Circuit cooldown elapsed, half-opening for a probe");
                    inner.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful call, closing the circuit
    pub fn on_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != BreakerState::Closed {
            info!("Circuit closed after successful probe");
        }
        inner.state = BreakerState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Records a failed call
    ///
    /// A failed half-open probe re-opens immediately; in the closed state
    /// the circuit opens once consecutive failures reach the threshold.
    pub fn on_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;

        let should_open = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.consecutive_failures >= self.failure_threshold,
            BreakerState::Open => false,
        };
        if should_open {
            warn!(
                failures = inner.consecutive_failures,
                cooldown_ms = self.cooldown.as_millis() as u64,
                "Circuit opened"
            );
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner.lock().unwrap().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_failures
    }
}

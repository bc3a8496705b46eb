//! Connectivity monitoring, retry execution and circuit breaking
//!
//! [`RetryManager`] is the generic retry executor: exponential backoff with
//! jitter, connectivity-aware deferral, per-class circuit breaking and
//! cooperative cancellation. [`HttpConnectivityMonitor`] implements the
//! connectivity port with an HTTP reachability probe.

pub mod breaker;
pub mod monitor;
pub mod retry;

pub use breaker::{BreakerState, CircuitBreaker};
pub use monitor::{HttpConnectivityMonitor, ManualConnectivityMonitor, ProbeConfig};
pub use retry::RetryManager;

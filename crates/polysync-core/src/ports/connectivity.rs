//! Connectivity monitor port
//!
//! Distinguishes "a network link is up" from "the internet is actually
//! reachable". The orchestrator gates queue draining on the latter, because
//! captive portals and dead gateways routinely present a link without
//! reachability.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Raw connectivity state as observed by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// No link at all
    Offline,
    /// Link up, reachability unverified
    LinkUp,
    /// Link up and internet verified reachable
    Online,
}

impl ConnectivityState {
    /// Returns true if a drain pass is worth attempting
    pub fn has_connectivity(&self) -> bool {
        matches!(self, ConnectivityState::LinkUp | ConnectivityState::Online)
    }
}

/// Port for observing network connectivity
#[async_trait::async_trait]
pub trait ConnectivityMonitor: Send + Sync {
    /// Cheap link-state query (no I/O beyond the platform API)
    fn is_network_available(&self) -> bool;

    /// Verifies true internet reachability with an actual probe
    async fn has_internet(&self) -> bool;

    /// Subscribes to raw state-change events
    ///
    /// Events may flap; subscribers are expected to debounce.
    fn subscribe(&self) -> broadcast::Receiver<ConnectivityState>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_connectivity() {
        assert!(!ConnectivityState::Offline.has_connectivity());
        assert!(ConnectivityState::LinkUp.has_connectivity());
        assert!(ConnectivityState::Online.has_connectivity());
    }
}

//! Connectivity monitors
//!
//! [`HttpConnectivityMonitor`] verifies reachability with a lightweight
//! HTTP probe (a captive-portal-style 204 endpoint). A link can be up
//! while the internet is unreachable, so the monitor distinguishes
//! `LinkUp` (the probe reached *something*) from `Online` (the probe
//! succeeded). [`ManualConnectivityMonitor`] is a scriptable monitor for
//! tests and embedding.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use url::Url;

use polysync_core::ports::connectivity::{ConnectivityMonitor, ConnectivityState};

/// How many state events the broadcast channel buffers per subscriber
const EVENT_BUFFER: usize = 64;

/// Probe endpoint and cadence
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    pub url: Url,
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            // Returns 204 with no body; the de-facto reachability endpoint
            url: Url::parse("http://connectivitycheck.gstatic.com/generate_204")
                .expect("static probe url parses"),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
        }
    }
}

/// Connectivity monitor backed by an HTTP reachability probe
pub struct HttpConnectivityMonitor {
    config: ProbeConfig,
    client: reqwest::Client,
    state: Mutex<ConnectivityState>,
    events: broadcast::Sender<ConnectivityState>,
}

impl HttpConnectivityMonitor {
    pub fn new(config: ProbeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            config,
            client,
            // Optimistic until the first probe says otherwise
            state: Mutex::new(ConnectivityState::LinkUp),
            events,
        }
    }

    /// Last state observed by a probe
    pub fn current_state(&self) -> ConnectivityState {
        *self.state.lock().unwrap()
    }

    /// Runs one probe and publishes the state if it changed
    pub async fn probe_once(&self) -> ConnectivityState {
        let state = match self.client.get(self.config.url.clone()).send().await {
            Ok(response) if response.status().is_success() => ConnectivityState::Online,
            Ok(response) => {
                // We reached a server, just not the one we expected; a
                // captive portal behaves exactly like this
                debug!(status = %response.status(), "Probe reached a server but did not succeed");
                ConnectivityState::LinkUp
            }
            Err(e) => {
                debug!(error = %e, "Connectivity probe failed");
                ConnectivityState::Offline
            }
        };
        self.publish(state);
        state
    }

    /// Spawns the periodic probe loop; abort the handle to stop it
    pub fn spawn_probe_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        info!(
            url = %monitor.config.url,
            interval_secs = monitor.config.interval.as_secs(),
            "Starting connectivity probe loop"
        );
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.interval);
            loop {
                ticker.tick().await;
                monitor.probe_once().await;
            }
        })
    }

    fn publish(&self, state: ConnectivityState) {
        let mut current = self.state.lock().unwrap();
        if *current != state {
            if state == ConnectivityState::Offline {
                warn!(?state, "Connectivity lost");
            } else {
                info!(?state, "Connectivity changed");
            }
            *current = state;
            let _ = self.events.send(state);
        }
    }
}

#[async_trait::async_trait]
impl ConnectivityMonitor for HttpConnectivityMonitor {
    fn is_network_available(&self) -> bool {
        self.current_state().has_connectivity()
    }

    async fn has_internet(&self) -> bool {
        self.probe_once().await == ConnectivityState::Online
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectivityState> {
        self.events.subscribe()
    }
}

/// Scriptable monitor whose state is set by the embedder
///
/// Used in tests and by hosts that already know connectivity from a
/// platform API.
pub struct ManualConnectivityMonitor {
    state: Mutex<ConnectivityState>,
    events: broadcast::Sender<ConnectivityState>,
}

impl ManualConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            state: Mutex::new(initial),
            events,
        }
    }

    pub fn online() -> Self {
        Self::new(ConnectivityState::Online)
    }

    pub fn offline() -> Self {
        Self::new(ConnectivityState::Offline)
    }

    /// Sets the state and broadcasts it to subscribers
    pub fn set_state(&self, state: ConnectivityState) {
        *self.state.lock().unwrap() = state;
        let _ = self.events.send(state);
    }
}

#[async_trait::async_trait]
impl ConnectivityMonitor for ManualConnectivityMonitor {
    fn is_network_available(&self) -> bool {
        self.state.lock().unwrap().has_connectivity()
    }

    async fn has_internet(&self) -> bool {
        *self.state.lock().unwrap() == ConnectivityState::Online
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectivityState> {
        self.events.subscribe()
    }
}

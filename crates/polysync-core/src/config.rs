//! Engine configuration
//!
//! [`SyncConfig`] is the host application's knob surface. Every field has a
//! default so an empty config is valid; hosts deserialize it from whatever
//! configuration store they use and hand it to the composition root.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::queue::RetryPolicy;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Automatic full-sync interval in seconds (0 disables auto-sync)
    pub auto_sync_interval_secs: u64,
    /// Debounce applied before draining the offline queue after a
    /// connectivity transition, in milliseconds
    pub queue_drain_debounce_ms: u64,
    /// Default retry attempts for queued operations
    pub queue_max_retries: u32,
    /// Files larger than this many bytes use resumable session uploads
    pub large_file_threshold: u64,
    /// Optional fixed chunk size override; when absent the chunker picks
    /// adaptively
    pub chunk_size_override: Option<u64>,
    /// Retry and circuit-breaker policy for immediate (non-queued) execution
    pub retry: RetryPolicy,
    /// File extensions included in directory scans (empty = all)
    pub scan_extensions: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_sync_interval_secs: 300,
            queue_drain_debounce_ms: 2_000,
            queue_max_retries: 3,
            large_file_threshold: 4 * 1024 * 1024,
            chunk_size_override: None,
            retry: RetryPolicy::default(),
            scan_extensions: Vec::new(),
        }
    }
}

impl SyncConfig {
    pub fn auto_sync_interval(&self) -> Option<Duration> {
        if self.auto_sync_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.auto_sync_interval_secs))
        }
    }

    pub fn queue_drain_debounce(&self) -> Duration {
        Duration::from_millis(self.queue_drain_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.auto_sync_interval(), Some(Duration::from_secs(300)));
        assert_eq!(config.large_file_threshold, 4 * 1024 * 1024);
        assert!(config.chunk_size_override.is_none());
    }

    #[test]
    fn test_zero_interval_disables_auto_sync() {
        let config = SyncConfig {
            auto_sync_interval_secs: 0,
            ..SyncConfig::default()
        };
        assert!(config.auto_sync_interval().is_none());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: SyncConfig =
            serde_json::from_str(r#"{"queue_max_retries": 7}"#).unwrap();
        assert_eq!(config.queue_max_retries, 7);
        assert_eq!(config.auto_sync_interval_secs, 300);
    }

    #[test]
    fn test_round_trip() {
        let config = SyncConfig {
            chunk_size_override: Some(1024 * 1024),
            scan_extensions: vec!["txt".to_string(), "md".to_string()],
            ..SyncConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: SyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}

//! Version history port (driven port, external collaborator)
//!
//! On every successful conflict resolution the orchestrator reports the
//! resulting version so an external store can append a history entry. The
//! store's internals are not this engine's concern.

use crate::domain::chunk::ChangeType;
use crate::domain::errors::SyncError;
use crate::domain::provider::CloudProvider;
use crate::domain::version::FileVersion;

/// Sink for version-history entries
#[async_trait::async_trait]
pub trait VersionHistory: Send + Sync {
    /// Appends one history entry for a file that changed
    async fn record(
        &self,
        file_path: &str,
        provider: CloudProvider,
        version: &FileVersion,
        change_type: ChangeType,
    ) -> Result<(), SyncError>;
}

/// A no-op sink for hosts that do not keep version history
#[derive(Debug, Default)]
pub struct NullVersionHistory;

#[async_trait::async_trait]
impl VersionHistory for NullVersionHistory {
    async fn record(
        &self,
        _file_path: &str,
        _provider: CloudProvider,
        _version: &FileVersion,
        _change_type: ChangeType,
    ) -> Result<(), SyncError> {
        Ok(())
    }
}

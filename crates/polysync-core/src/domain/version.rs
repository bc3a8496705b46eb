//! File version snapshots
//!
//! [`FileVersion`] captures the state of one side of a file (local or
//! remote) at detection time. Instances are immutable once constructed;
//! conflict detection compares two of them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A snapshot of a file's state at one side (local or remote)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileVersion {
    path: PathBuf,
    size: u64,
    modified_at: DateTime<Utc>,
    checksum: Option<String>,
    mime_type: Option<String>,
    exists: bool,
    /// Provider-specific extras (etags, revision ids) that do not
    /// participate in comparison
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    extras: serde_json::Map<String, serde_json::Value>,
}

impl FileVersion {
    /// Creates a snapshot of an existing file
    pub fn new(path: impl Into<PathBuf>, size: u64, modified_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            size,
            modified_at,
            checksum: None,
            mime_type: None,
            exists: true,
            extras: serde_json::Map::new(),
        }
    }

    /// Creates a snapshot recording that the file is absent on this side
    pub fn absent(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            size: 0,
            modified_at: Utc::now(),
            checksum: None,
            mime_type: None,
            exists: false,
            extras: serde_json::Map::new(),
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified_at(&self) -> DateTime<Utc> {
        self.modified_at
    }

    pub fn checksum(&self) -> Option<&str> {
        self.checksum.as_deref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn extra(&self, key: &str) -> Option<&serde_json::Value> {
        self.extras.get(key)
    }

    /// Returns true if two snapshots describe the same file content
    ///
    /// Identity requires matching existence flags, matching sizes,
    /// modification timestamps within one second of each other, and, when
    /// both sides carry checksums, matching checksums.
    pub fn is_identical(&self, other: &FileVersion) -> bool {
        if self.exists != other.exists {
            return false;
        }
        if !self.exists {
            // Both absent: nothing to compare
            return true;
        }
        if self.size != other.size {
            return false;
        }
        let drift = (self.modified_at - other.modified_at).num_seconds().abs();
        if drift > 1 {
            return false;
        }
        match (&self.checksum, &other.checksum) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

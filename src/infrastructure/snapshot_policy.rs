// Copyright 2025 Cowboy AI, LLC.

//! Snapshot policy deciding when a processed aggregate is worth snapshotting

use serde::{Deserialize, Serialize};

/// Default number of versions between two snapshots
pub const DEFAULT_VERSION_OFFSET: u32 = 5;

/// Policy configuration for automatic snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotPolicy {
    /// Whether snapshots are taken at all
    pub enabled: bool,
    /// Minimum versions between the stored snapshot and a new one
    pub version_offset: u32,
}

impl Default for SnapshotPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            version_offset: DEFAULT_VERSION_OFFSET,
        }
    }
}

impl SnapshotPolicy {
    /// A policy that never snapshots
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Snapshot on every processed version
    pub fn every_version() -> Self {
        Self {
            enabled: true,
            version_offset: 1,
        }
    }

    /// Whether `current_version` is far enough from `snapshot_version`
    pub fn should_snapshot(&self, snapshot_version: u32, current_version: u32) -> bool {
        self.enabled && current_version.saturating_sub(snapshot_version) >= self.version_offset.max(1)
    }
}

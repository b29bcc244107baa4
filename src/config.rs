// Copyright 2025 Cowboy AI, LLC.

//! Runtime configuration
//!
//! Built once at startup and passed explicitly to the components that need it.

use crate::errors::DomainError;
use crate::infrastructure::{NatsConfig, SnapshotPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Wait tracking settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Endpoint signals for commands sent from this node are delivered to
    pub endpoint: String,
    /// Deadline applied when a caller gives none
    pub default_timeout_ms: u64,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            endpoint: "local".to_string(),
            default_timeout_ms: 30_000,
        }
    }
}

impl WaitConfig {
    /// [`WaitConfig::default_timeout_ms`] as a duration
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

/// Command processing settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Reload-and-retry attempts after an event version conflict
    pub max_conflict_retries: u32,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 3,
        }
    }
}

/// Snapshot settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Whether processed aggregates are snapshotted
    pub enabled: bool,
    /// Minimum versions between two snapshots
    pub version_offset: u32,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        let policy = SnapshotPolicy::default();
        Self {
            enabled: policy.enabled,
            version_offset: policy.version_offset,
        }
    }
}

impl SnapshotConfig {
    /// Policy described by this configuration
    pub fn policy(&self) -> SnapshotPolicy {
        SnapshotPolicy {
            enabled: self.enabled,
            version_offset: self.version_offset,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcingConfig {
    /// Wait tracking
    pub wait: WaitConfig,
    /// Command processing
    pub command: CommandConfig,
    /// Snapshots
    pub snapshot: SnapshotConfig,
    /// Remote signal transport; local delivery only when absent
    pub nats: Option<NatsConfig>,
}

impl SourcingConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        Ok(serde_json::from_str(json)?)
    }
}

// Copyright 2025 Cowboy AI, LLC.

//! Snapshot repository for aggregate state
//!
//! A snapshot is an optional fast path for reconstruction: the materialized
//! `(state, version)` pair of an aggregate at some point of its history.

use crate::errors::{codes, ErrorInfoCapable};
use crate::identifiers::AggregateId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

/// Errors that can occur during snapshot operations
#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    /// Error from underlying storage system
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Error serializing or deserializing snapshot data
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for SnapshotError {
    fn from(err: serde_json::Error) -> Self {
        SnapshotError::SerializationError(err.to_string())
    }
}

impl ErrorInfoCapable for SnapshotError {
    fn error_code(&self) -> &'static str {
        match self {
            SnapshotError::StorageError(_) => codes::INTERNAL_SERVER_ERROR,
            SnapshotError::SerializationError(_) => codes::BAD_REQUEST,
        }
    }
}

/// Snapshot of aggregate state at a specific version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    /// Aggregate this snapshot belongs to
    pub aggregate_id: AggregateId,
    /// Version of the aggregate when the snapshot was taken
    pub version: u32,
    /// Serialized state
    pub state: serde_json::Value,
    /// Whether the aggregate was deleted at that version
    pub deleted: bool,
    /// Id of the last stream folded into the state
    pub event_id: String,
    /// Creation time of the first stream, epoch milliseconds
    pub first_event_time: i64,
    /// Creation time of the last stream, epoch milliseconds
    pub event_time: i64,
    /// When the snapshot was taken, epoch milliseconds
    pub snapshot_time: i64,
}

/// Trait for storing and retrieving aggregate snapshots
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Get the most recent snapshot for an aggregate
    async fn load(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<AggregateSnapshot>, SnapshotError>;

    /// Save a snapshot, replacing older ones
    async fn save(&self, snapshot: AggregateSnapshot) -> Result<(), SnapshotError>;

    /// Version of the latest snapshot, 0 when none exists
    async fn version(&self, aggregate_id: &AggregateId) -> Result<u32, SnapshotError> {
        Ok(self
            .load(aggregate_id)
            .await?
            .map(|snapshot| snapshot.version)
            .unwrap_or_default())
    }
}

/// Repository that never stores anything; every load replays from scratch
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpSnapshotRepository;

#[async_trait]
impl SnapshotRepository for NoOpSnapshotRepository {
    async fn load(
        &self,
        _aggregate_id: &AggregateId,
    ) -> Result<Option<AggregateSnapshot>, SnapshotError> {
        Ok(None)
    }

    async fn save(&self, _snapshot: AggregateSnapshot) -> Result<(), SnapshotError> {
        Ok(())
    }
}

/// In-memory snapshot repository
#[derive(Debug, Default, Clone)]
pub struct InMemorySnapshotRepository {
    snapshots: Arc<RwLock<HashMap<AggregateId, AggregateSnapshot>>>,
}

impl InMemorySnapshotRepository {
    /// Create a new in-memory snapshot repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn load(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<AggregateSnapshot>, SnapshotError> {
        let snapshots = self.snapshots.read().await;
        Ok(snapshots.get(aggregate_id).cloned())
    }

    async fn save(&self, snapshot: AggregateSnapshot) -> Result<(), SnapshotError> {
        debug!(
            aggregate_id = %snapshot.aggregate_id,
            version = snapshot.version,
            "Saving snapshot"
        );
        let mut snapshots = self.snapshots.write().await;
        // an older snapshot never replaces a newer one
        match snapshots.get(&snapshot.aggregate_id) {
            Some(existing) if existing.version >= snapshot.version => {}
            _ => {
                snapshots.insert(snapshot.aggregate_id.clone(), snapshot);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::NamedAggregate;

    fn snapshot(aggregate_id: &AggregateId, version: u32) -> AggregateSnapshot {
        AggregateSnapshot {
            aggregate_id: aggregate_id.clone(),
            version,
            state: serde_json::json!({ "count": version }),
            deleted: false,
            event_id: format!("event-{version}"),
            first_event_time: 1,
            event_time: version as i64,
            snapshot_time: 0,
        }
    }

    #[tokio::test]
    async fn test_in_memory_snapshot_repository() {
        let repository = InMemorySnapshotRepository::new();
        let id = NamedAggregate::new("test", "counter").aggregate_id("1");

        repository.save(snapshot(&id, 5)).await.unwrap();
        let retrieved = repository.load(&id).await.unwrap().unwrap();
        assert_eq!(retrieved.version, 5);
        assert_eq!(retrieved.state["count"], 5);

        // stale snapshot ignored
        repository.save(snapshot(&id, 3)).await.unwrap();
        assert_eq!(repository.version(&id).await.unwrap(), 5);

        let other = NamedAggregate::new("test", "counter").aggregate_id("2");
        assert!(repository.load(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_op_repository() {
        let repository = NoOpSnapshotRepository;
        let id = NamedAggregate::new("test", "counter").aggregate_id("1");
        repository.save(snapshot(&id, 2)).await.unwrap();
        assert!(repository.load(&id).await.unwrap().is_none());
        assert_eq!(repository.version(&id).await.unwrap(), 0);
    }
}

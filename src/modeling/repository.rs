// Copyright 2025 Cowboy AI, LLC.

//! Reconstruction engine: snapshot fast path plus event replay

use super::sourcing::{SourcedState, SourcingRegistry};
use super::state::{SourcingError, StateAggregate};
use crate::events::{now_millis, INITIAL_VERSION};
use crate::identifiers::AggregateId;
use crate::infrastructure::{
    AggregateSnapshot, EventStore, NoOpSnapshotRepository, SnapshotError, SnapshotRepository,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Loads [`StateAggregate`]s of one state type
pub struct StateAggregateRepository<S: SourcedState> {
    event_store: Arc<dyn EventStore>,
    snapshots: Arc<dyn SnapshotRepository>,
    registry: Arc<SourcingRegistry<S>>,
}

impl<S: SourcedState> Clone for StateAggregateRepository<S> {
    fn clone(&self) -> Self {
        Self {
            event_store: Arc::clone(&self.event_store),
            snapshots: Arc::clone(&self.snapshots),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: SourcedState> StateAggregateRepository<S> {
    /// Create a repository reading from `event_store` and `snapshots`
    pub fn new(event_store: Arc<dyn EventStore>, snapshots: Arc<dyn SnapshotRepository>) -> Self {
        Self {
            event_store,
            snapshots,
            registry: Arc::new(S::sourcing_registry()),
        }
    }

    /// Repository that always replays from the first version
    pub fn without_snapshots(event_store: Arc<dyn EventStore>) -> Self {
        Self::new(event_store, Arc::new(NoOpSnapshotRepository))
    }

    /// Event store this repository reads from
    pub fn event_store(&self) -> &Arc<dyn EventStore> {
        &self.event_store
    }

    /// Snapshot repository this repository reads from
    pub fn snapshots(&self) -> &Arc<dyn SnapshotRepository> {
        &self.snapshots
    }

    /// A fresh, uninitialized aggregate
    pub fn empty(&self, aggregate_id: AggregateId) -> StateAggregate<S> {
        StateAggregate::empty(aggregate_id, S::default(), Arc::clone(&self.registry))
    }

    /// Load the current state of an aggregate
    pub async fn load(&self, aggregate_id: &AggregateId) -> Result<StateAggregate<S>, SourcingError> {
        self.load_to(aggregate_id, u32::MAX).await
    }

    /// Load the state as of `tail_version`, inclusive
    pub async fn load_to(
        &self,
        aggregate_id: &AggregateId,
        tail_version: u32,
    ) -> Result<StateAggregate<S>, SourcingError> {
        let mut aggregate = match self.snapshots.load(aggregate_id).await? {
            Some(snapshot) if snapshot.version <= tail_version => self.restore(snapshot)?,
            _ => self.empty(aggregate_id.clone()),
        };
        let head_version = aggregate.expected_next_version();
        if head_version > tail_version {
            return Ok(aggregate);
        }

        let streams = self
            .event_store
            .load(aggregate_id, head_version, tail_version)
            .await?;
        debug!(
            aggregate_id = %aggregate_id,
            head_version,
            streams = streams.len(),
            "Sourcing aggregate"
        );
        for stream in &streams {
            aggregate.on_sourcing(stream)?;
        }
        Ok(aggregate)
    }

    /// Replay from scratch every stream created up to `tail_time`
    pub async fn load_until(
        &self,
        aggregate_id: &AggregateId,
        tail_time: i64,
    ) -> Result<StateAggregate<S>, SourcingError> {
        let mut aggregate = self.empty(aggregate_id.clone());
        let streams = self
            .event_store
            .load_by_time(aggregate_id, 0, tail_time)
            .await?;
        for stream in &streams {
            aggregate.on_sourcing(stream)?;
        }
        Ok(aggregate)
    }

    /// Persist the aggregate as a snapshot
    pub async fn save_snapshot(&self, aggregate: &StateAggregate<S>) -> Result<(), SourcingError> {
        if !aggregate.initialized() {
            warn!(
                aggregate_id = %aggregate.aggregate_id(),
                "Skipping snapshot of uninitialized aggregate"
            );
            return Ok(());
        }
        let snapshot = AggregateSnapshot {
            aggregate_id: aggregate.aggregate_id().clone(),
            version: aggregate.version(),
            state: serde_json::to_value(aggregate.state()).map_err(SnapshotError::from)?,
            deleted: aggregate.deleted(),
            event_id: aggregate.event_id().to_string(),
            first_event_time: aggregate.first_event_time(),
            event_time: aggregate.event_time(),
            snapshot_time: now_millis(),
        };
        self.snapshots.save(snapshot).await?;
        Ok(())
    }

    fn restore(&self, snapshot: AggregateSnapshot) -> Result<StateAggregate<S>, SourcingError> {
        debug!(
            aggregate_id = %snapshot.aggregate_id,
            version = snapshot.version,
            "Restoring aggregate from snapshot"
        );
        let state: S = serde_json::from_value(snapshot.state)
            .map_err(SnapshotError::from)?;
        if snapshot.version < INITIAL_VERSION {
            return Ok(self.empty(snapshot.aggregate_id));
        }
        Ok(StateAggregate::restore(
            snapshot.aggregate_id,
            state,
            snapshot.version,
            snapshot.deleted,
            snapshot.event_id,
            snapshot.first_event_time,
            snapshot.event_time,
            Arc::clone(&self.registry),
        ))
    }
}

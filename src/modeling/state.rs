// Copyright 2025 Cowboy AI, LLC.

//! State aggregate: typed state materialized by folding event streams

use super::sourcing::SourcingRegistry;
use crate::errors::{codes, ErrorInfoCapable};
use crate::events::{AggregateDeleted, AggregateRecovered, DomainEventStream, UNINITIALIZED_VERSION};
use crate::identifiers::AggregateId;
use crate::infrastructure::{EventStoreError, SnapshotError};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised while reconstructing an aggregate
#[derive(Debug, Clone, Error)]
pub enum SourcingError {
    /// The stream does not carry the expected next version
    #[error("Sourcing version conflict: {aggregate_id} expected version {expected} but received {actual}")]
    SourcingVersionConflict {
        /// Aggregate being folded
        aggregate_id: AggregateId,
        /// Expected next version
        expected: u32,
        /// Version carried by the stream
        actual: u32,
    },

    /// The stream belongs to another aggregate
    #[error("Aggregate id mismatch: state {expected} received stream of {actual}")]
    AggregateIdMismatch {
        /// Aggregate of the state
        expected: AggregateId,
        /// Aggregate of the stream
        actual: AggregateId,
    },

    /// A sourcing handler could not apply an event
    #[error("Sourcing handler for {event} failed: {reason}")]
    HandlerFailed {
        /// Event name
        event: String,
        /// Failure reason
        reason: String,
    },

    /// Error from the event store
    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    /// Error from the snapshot repository
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

impl ErrorInfoCapable for SourcingError {
    fn error_code(&self) -> &'static str {
        match self {
            SourcingError::SourcingVersionConflict { .. } => codes::SOURCING_VERSION_CONFLICT,
            SourcingError::EventStore(e) => e.error_code(),
            SourcingError::Snapshot(e) => e.error_code(),
            SourcingError::AggregateIdMismatch { .. } | SourcingError::HandlerFailed { .. } => {
                codes::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// An aggregate's typed state together with its version bookkeeping
///
/// Owned by a single load; mutated only through [`StateAggregate::on_sourcing`].
pub struct StateAggregate<S> {
    aggregate_id: AggregateId,
    state: S,
    version: u32,
    deleted: bool,
    event_id: String,
    first_event_time: i64,
    event_time: i64,
    registry: Arc<SourcingRegistry<S>>,
}

impl<S: 'static> StateAggregate<S> {
    /// An empty, uninitialized aggregate
    pub fn empty(aggregate_id: AggregateId, state: S, registry: Arc<SourcingRegistry<S>>) -> Self {
        Self {
            aggregate_id,
            state,
            version: UNINITIALIZED_VERSION,
            deleted: false,
            event_id: String::new(),
            first_event_time: 0,
            event_time: 0,
            registry,
        }
    }

    /// Restore an aggregate at a known version, typically from a snapshot
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        aggregate_id: AggregateId,
        state: S,
        version: u32,
        deleted: bool,
        event_id: String,
        first_event_time: i64,
        event_time: i64,
        registry: Arc<SourcingRegistry<S>>,
    ) -> Self {
        Self {
            aggregate_id,
            state,
            version,
            deleted,
            event_id,
            first_event_time,
            event_time,
            registry,
        }
    }

    /// Aggregate identity
    pub fn aggregate_id(&self) -> &AggregateId {
        &self.aggregate_id
    }

    /// Current state
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Consume the aggregate, returning its state
    pub fn into_state(self) -> S {
        self.state
    }

    /// Version of the last applied stream
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Version the next appended stream must carry
    pub fn expected_next_version(&self) -> u32 {
        self.version + 1
    }

    /// Whether at least one stream was applied
    pub fn initialized(&self) -> bool {
        self.version > UNINITIALIZED_VERSION
    }

    /// Whether a deletion event was applied
    pub fn deleted(&self) -> bool {
        self.deleted
    }

    /// Id of the last applied stream
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Creation time of the first applied stream
    pub fn first_event_time(&self) -> i64 {
        self.first_event_time
    }

    /// Creation time of the last applied stream
    pub fn event_time(&self) -> i64 {
        self.event_time
    }

    /// Fold one stream onto the state
    ///
    /// Streams marked ignore-sourcing are skipped without touching state or
    /// version. Any other stream must carry exactly the expected next version.
    pub fn on_sourcing(&mut self, stream: &DomainEventStream) -> Result<(), SourcingError> {
        if stream.ignore_sourcing() {
            debug!(
                aggregate_id = %self.aggregate_id,
                stream_id = %stream.id,
                "Ignore sourcing of notification stream"
            );
            return Ok(());
        }
        if stream.aggregate_id != self.aggregate_id {
            return Err(SourcingError::AggregateIdMismatch {
                expected: self.aggregate_id.clone(),
                actual: stream.aggregate_id.clone(),
            });
        }
        if stream.version != self.expected_next_version() {
            error!(
                aggregate_id = %self.aggregate_id,
                expected = self.expected_next_version(),
                actual = stream.version,
                "Sourcing version conflict"
            );
            return Err(SourcingError::SourcingVersionConflict {
                aggregate_id: self.aggregate_id.clone(),
                expected: self.expected_next_version(),
                actual: stream.version,
            });
        }

        for event in stream {
            if event.is::<AggregateDeleted>() {
                self.deleted = true;
            } else if event.is::<AggregateRecovered>() {
                self.deleted = false;
            }
            if !self.registry.apply(&mut self.state, event)? {
                debug!(
                    aggregate_id = %self.aggregate_id,
                    event = %event.name,
                    "No sourcing handler, event skipped"
                );
            }
        }

        self.version = stream.version;
        self.event_id = stream.id.clone();
        self.event_time = stream.create_time;
        if stream.is_initial_version() {
            self.first_event_time = stream.create_time;
        }
        Ok(())
    }
}

impl<S: Clone> Clone for StateAggregate<S> {
    fn clone(&self) -> Self {
        Self {
            aggregate_id: self.aggregate_id.clone(),
            state: self.state.clone(),
            version: self.version,
            deleted: self.deleted,
            event_id: self.event_id.clone(),
            first_event_time: self.first_event_time,
            event_time: self.event_time,
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<S: fmt::Debug> fmt::Debug for StateAggregate<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateAggregate")
            .field("aggregate_id", &self.aggregate_id)
            .field("version", &self.version)
            .field("deleted", &self.deleted)
            .field("state", &self.state)
            .finish()
    }
}

// Copyright 2025 Cowboy AI, LLC.

//! Event store trait and related types
//!
//! The store is an append-only log per aggregate. Appends to one aggregate
//! behave as a compare-and-swap on the tail version; appends to different
//! aggregates never block each other.

use crate::errors::{codes, ErrorInfoCapable};
use crate::events::{DomainEventStream, INITIAL_VERSION};
use crate::identifiers::AggregateId;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when working with the event store
#[derive(Debug, Clone, Error)]
pub enum EventStoreError {
    /// Appended version is not the tail version + 1; reload and retry
    #[error("Event version conflict: {aggregate_id} stream version {version} does not follow tail version {tail_version}")]
    EventVersionConflict {
        /// Aggregate of the rejected stream
        aggregate_id: AggregateId,
        /// Version of the rejected stream
        version: u32,
        /// Tail version found in the store
        tail_version: u32,
    },

    /// A concurrent creator already appended the initial version
    #[error("Duplicate aggregate id: {aggregate_id} already exists")]
    DuplicateAggregateId {
        /// Aggregate that already exists
        aggregate_id: AggregateId,
    },

    /// The request was already applied to this aggregate
    #[error("Duplicate request id: {request_id} already applied to {aggregate_id}")]
    DuplicateRequestId {
        /// Aggregate the request was applied to
        aggregate_id: AggregateId,
        /// Repeated request id
        request_id: String,
    },

    /// Invalid arguments for a load
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// General storage operation failed
    #[error("Storage error: {0}")]
    StorageError(String),
}

impl EventStoreError {
    /// Whether reloading the aggregate and retrying can succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, EventStoreError::EventVersionConflict { .. })
    }
}

impl ErrorInfoCapable for EventStoreError {
    fn error_code(&self) -> &'static str {
        match self {
            EventStoreError::EventVersionConflict { .. } => codes::EVENT_VERSION_CONFLICT,
            EventStoreError::DuplicateAggregateId { .. } => codes::DUPLICATE_AGGREGATE_ID,
            EventStoreError::DuplicateRequestId { .. } => codes::DUPLICATE_REQUEST_ID,
            EventStoreError::InvalidRange(_) => codes::BAD_REQUEST,
            EventStoreError::StorageError(_) => codes::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Event store contract
///
/// Backends implement the `*_stream` methods; the provided methods validate
/// arguments and normalize errors, so every backend reports a lost creation
/// race as [`EventStoreError::DuplicateAggregateId`].
#[async_trait]
pub trait EventStore: Send + Sync + fmt::Debug {
    /// Persist a stream; must be atomic per `(aggregate_id, version)`
    async fn append_stream(&self, stream: DomainEventStream) -> Result<(), EventStoreError>;

    /// Streams with `head_version <= version <= tail_version`, ascending
    async fn load_stream(
        &self,
        aggregate_id: &AggregateId,
        head_version: u32,
        tail_version: u32,
    ) -> Result<Vec<DomainEventStream>, EventStoreError>;

    /// Streams with `head_time <= create_time <= tail_time`, ascending by version
    async fn load_stream_by_time(
        &self,
        aggregate_id: &AggregateId,
        head_time: i64,
        tail_time: i64,
    ) -> Result<Vec<DomainEventStream>, EventStoreError>;

    /// Append a stream, mapping an initial-version conflict to a duplicate aggregate
    async fn append(&self, stream: DomainEventStream) -> Result<(), EventStoreError> {
        debug!(
            aggregate_id = %stream.aggregate_id,
            version = stream.version,
            "Append event stream"
        );
        match self.append_stream(stream).await {
            Err(EventStoreError::EventVersionConflict {
                aggregate_id,
                version,
                ..
            }) if version == INITIAL_VERSION => {
                Err(EventStoreError::DuplicateAggregateId { aggregate_id })
            }
            other => other,
        }
    }

    /// Load an inclusive version range
    async fn load(
        &self,
        aggregate_id: &AggregateId,
        head_version: u32,
        tail_version: u32,
    ) -> Result<Vec<DomainEventStream>, EventStoreError> {
        debug!(
            aggregate_id = %aggregate_id,
            head_version,
            tail_version,
            "Load event streams"
        );
        if tail_version < head_version {
            return Err(EventStoreError::InvalidRange(format!(
                "{aggregate_id} tail version {tail_version} must be >= head version {head_version}"
            )));
        }
        self.load_stream(aggregate_id, head_version, tail_version)
            .await
    }

    /// Load every stream of an aggregate
    async fn load_all(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Vec<DomainEventStream>, EventStoreError> {
        self.load(aggregate_id, INITIAL_VERSION, u32::MAX).await
    }

    /// Load an inclusive creation time range, for audit and time travel
    async fn load_by_time(
        &self,
        aggregate_id: &AggregateId,
        head_time: i64,
        tail_time: i64,
    ) -> Result<Vec<DomainEventStream>, EventStoreError> {
        if tail_time < head_time {
            return Err(EventStoreError::InvalidRange(format!(
                "{aggregate_id} tail time {tail_time} must be >= head time {head_time}"
            )));
        }
        self.load_stream_by_time(aggregate_id, head_time, tail_time)
            .await
    }

    /// The stream at exactly `version`
    async fn single(
        &self,
        aggregate_id: &AggregateId,
        version: u32,
    ) -> Result<Option<DomainEventStream>, EventStoreError> {
        Ok(self.load(aggregate_id, version, version).await?.pop())
    }

    /// The tail stream of an aggregate
    async fn last(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<DomainEventStream>, EventStoreError> {
        Ok(self.load_all(aggregate_id).await?.pop())
    }

    /// The tail version, 0 for an empty stream
    async fn tail_version(&self, aggregate_id: &AggregateId) -> Result<u32, EventStoreError> {
        Ok(self
            .last(aggregate_id)
            .await?
            .map(|stream| stream.version)
            .unwrap_or_default())
    }
}

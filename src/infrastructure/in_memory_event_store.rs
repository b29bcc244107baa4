// Copyright 2025 Cowboy AI, LLC.

//! In-memory event store
//!
//! Each aggregate owns its own log behind its own mutex, so appends are
//! serialized per aggregate id while distinct aggregates proceed in parallel.

use super::event_store::{EventStore, EventStoreError};
use crate::events::DomainEventStream;
use crate::identifiers::AggregateId;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

type AggregateLog = Arc<Mutex<Vec<DomainEventStream>>>;

/// Event store keeping every stream in memory
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    logs: Arc<RwLock<HashMap<AggregateId, AggregateLog>>>,
}

impl InMemoryEventStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    async fn log_of(&self, aggregate_id: &AggregateId) -> Option<AggregateLog> {
        self.logs.read().await.get(aggregate_id).cloned()
    }

    async fn log_or_create(&self, aggregate_id: &AggregateId) -> AggregateLog {
        if let Some(log) = self.log_of(aggregate_id).await {
            return log;
        }
        let mut logs = self.logs.write().await;
        logs.entry(aggregate_id.clone()).or_default().clone()
    }

    /// Number of aggregates with at least one stream
    pub async fn aggregate_count(&self) -> usize {
        let logs = self.logs.read().await;
        let mut count = 0;
        for log in logs.values() {
            if !log.lock().await.is_empty() {
                count += 1;
            }
        }
        count
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_stream(&self, stream: DomainEventStream) -> Result<(), EventStoreError> {
        let log = self.log_or_create(&stream.aggregate_id).await;
        let mut log = log.lock().await;

        let tail_version = log.last().map(|s| s.version).unwrap_or_default();
        if stream.version != tail_version + 1 {
            warn!(
                aggregate_id = %stream.aggregate_id,
                version = stream.version,
                tail_version,
                "Event version conflict"
            );
            return Err(EventStoreError::EventVersionConflict {
                aggregate_id: stream.aggregate_id,
                version: stream.version,
                tail_version,
            });
        }
        if log.iter().any(|s| s.request_id == stream.request_id) {
            return Err(EventStoreError::DuplicateRequestId {
                aggregate_id: stream.aggregate_id,
                request_id: stream.request_id,
            });
        }

        debug!(
            aggregate_id = %stream.aggregate_id,
            version = stream.version,
            events = stream.size(),
            "Stored event stream"
        );
        log.push(stream);
        Ok(())
    }

    async fn load_stream(
        &self,
        aggregate_id: &AggregateId,
        head_version: u32,
        tail_version: u32,
    ) -> Result<Vec<DomainEventStream>, EventStoreError> {
        let Some(log) = self.log_of(aggregate_id).await else {
            return Ok(Vec::new());
        };
        let log = log.lock().await;
        Ok(log
            .iter()
            .filter(|s| (head_version..=tail_version).contains(&s.version))
            .cloned()
            .collect())
    }

    async fn load_stream_by_time(
        &self,
        aggregate_id: &AggregateId,
        head_time: i64,
        tail_time: i64,
    ) -> Result<Vec<DomainEventStream>, EventStoreError> {
        let Some(log) = self.log_of(aggregate_id).await else {
            return Ok(Vec::new());
        };
        let log = log.lock().await;
        Ok(log
            .iter()
            .filter(|s| (head_time..=tail_time).contains(&s.create_time))
            .cloned()
            .collect())
    }

    async fn last(
        &self,
        aggregate_id: &AggregateId,
    ) -> Result<Option<DomainEventStream>, EventStoreError> {
        let Some(log) = self.log_of(aggregate_id).await else {
            return Ok(None);
        };
        let last = log.lock().await.last().cloned();
        Ok(last)
    }
}

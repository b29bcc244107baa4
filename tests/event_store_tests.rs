// Copyright 2025 Cowboy AI, LLC.

//! Event store and reconstruction contracts

use cim_sourcing::errors::codes;
use cim_sourcing::events::{AggregateDeleted, DomainEventBody};
use cim_sourcing::infrastructure::{InMemorySnapshotRepository, SnapshotRepository};
use cim_sourcing::{
    AggregateId, DomainEventStream, ErrorInfo, ErrorInfoCapable, EventStore, EventStoreError,
    InMemoryEventStore, NamedAggregate, SourcedState, SourcingError, SourcingRegistry,
    StateAggregateRepository,
};
use pretty_assertions::assert_eq;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Ledger {
    entries: Vec<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Posted {
    amount: i64,
}

impl DomainEventBody for Posted {
    const NAME: &'static str = "posted";
}

impl SourcedState for Ledger {
    fn named_aggregate() -> NamedAggregate {
        NamedAggregate::new("finance", "ledger")
    }

    fn sourcing_registry() -> SourcingRegistry<Self> {
        SourcingRegistry::new().on(|state: &mut Ledger, event: Posted| {
            state.entries.push(event.amount)
        })
    }
}

fn ledger_id() -> AggregateId {
    Ledger::named_aggregate().aggregate_id("l-1")
}

fn posted(version: u32) -> DomainEventStream {
    DomainEventStream::builder(ledger_id(), version)
        .command(format!("cmd-{version}"), format!("req-{version}"))
        .event(&Posted {
            amount: i64::from(version),
        })
        .unwrap()
        .build()
}

#[tokio::test]
async fn test_append_conflicts_and_duplicate_creation() {
    let store = InMemoryEventStore::new();
    store.append(posted(1)).await.unwrap();
    store.append(posted(2)).await.unwrap();

    let conflict = store.append(posted(2)).await.unwrap_err();
    assert!(matches!(
        conflict,
        EventStoreError::EventVersionConflict {
            version: 2,
            tail_version: 2,
            ..
        }
    ));
    assert!(conflict.is_retryable());

    let racing_creator = store.append(posted(1)).await.unwrap_err();
    assert!(matches!(racing_creator, EventStoreError::DuplicateAggregateId { .. }));
    assert_eq!(racing_creator.error_code(), codes::DUPLICATE_AGGREGATE_ID);
    assert!(!racing_creator.is_retryable());
}

#[tokio::test]
async fn test_version_gap_is_rejected() {
    let store = InMemoryEventStore::new();
    store.append(posted(1)).await.unwrap();
    assert!(matches!(
        store.append(posted(3)).await,
        Err(EventStoreError::EventVersionConflict { .. })
    ));
    assert_eq!(store.tail_version(&ledger_id()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_load_single_version_range() {
    let store = InMemoryEventStore::new();
    for version in 1..=3 {
        store.append(posted(version)).await.unwrap();
    }
    let streams = store.load(&ledger_id(), 2, 2).await.unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0].version, 2);

    assert_eq!(store.last(&ledger_id()).await.unwrap().unwrap().version, 3);
    assert!(matches!(
        store.load(&ledger_id(), 3, 2).await,
        Err(EventStoreError::InvalidRange(_))
    ));
}

#[tokio::test]
async fn test_fold_versions_and_ignored_error_stream() {
    let store = Arc::new(InMemoryEventStore::new());
    let repository = StateAggregateRepository::<Ledger>::without_snapshots(store.clone());
    for version in 1..=4 {
        store.append(posted(version)).await.unwrap();
    }

    let mut aggregate = repository.load(&ledger_id()).await.unwrap();
    assert_eq!(aggregate.version(), 4);
    assert_eq!(aggregate.expected_next_version(), 5);
    assert_eq!(aggregate.state().entries, vec![1, 2, 3, 4]);

    let failure = DomainEventStream::error_stream(
        ledger_id(),
        5,
        "cmd-5",
        "req-5",
        &ErrorInfo::of("Rejected", "closed period"),
    )
    .unwrap();
    aggregate.on_sourcing(&failure).unwrap();
    assert_eq!(aggregate.version(), 4);
    assert_eq!(aggregate.state().entries.len(), 4);

    aggregate.on_sourcing(&posted(5)).unwrap();
    assert_eq!(aggregate.version(), 5);
}

#[tokio::test]
async fn test_out_of_order_stream_is_fatal() {
    let store = Arc::new(InMemoryEventStore::new());
    let repository = StateAggregateRepository::<Ledger>::without_snapshots(store);
    let mut aggregate = repository.empty(ledger_id());
    aggregate.on_sourcing(&posted(1)).unwrap();

    let error = aggregate.on_sourcing(&posted(3)).unwrap_err();
    assert!(matches!(
        error,
        SourcingError::SourcingVersionConflict {
            expected: 2,
            actual: 3,
            ..
        }
    ));
    assert_eq!(error.error_code(), codes::SOURCING_VERSION_CONFLICT);
}

#[tokio::test]
async fn test_snapshot_then_replay_tail() {
    let store = Arc::new(InMemoryEventStore::new());
    let snapshots = Arc::new(InMemorySnapshotRepository::new());
    let repository = StateAggregateRepository::<Ledger>::new(store.clone(), snapshots.clone());
    for version in 1..=3 {
        store.append(posted(version)).await.unwrap();
    }
    let aggregate = repository.load(&ledger_id()).await.unwrap();
    repository.save_snapshot(&aggregate).await.unwrap();
    assert_eq!(snapshots.version(&ledger_id()).await.unwrap(), 3);

    store.append(posted(4)).await.unwrap();
    let deleted = DomainEventStream::builder(ledger_id(), 5)
        .event(&AggregateDeleted {})
        .unwrap()
        .build();
    store.append(deleted).await.unwrap();

    let aggregate = repository.load(&ledger_id()).await.unwrap();
    assert_eq!(aggregate.version(), 5);
    assert!(aggregate.deleted());
    assert_eq!(aggregate.state().entries, vec![1, 2, 3, 4]);

    let as_of_two = repository.load_to(&ledger_id(), 2).await.unwrap();
    assert_eq!(as_of_two.state().entries, vec![1, 2]);
}

// Copyright 2025 Cowboy AI, LLC.

//! Infrastructure layer for cim-sourcing
//!
//! This module contains the storage and transport concerns:
//! - Event store contract and in-memory implementation
//! - Snapshot storage and snapshot policy
//! - NATS transport for remote wait signals

pub mod event_store;
pub mod in_memory_event_store;
pub mod nats_client;
pub mod nats_wait_notifier;
/// Snapshot policy deciding when processed aggregates are snapshotted
pub mod snapshot_policy;
pub mod snapshot_store;

pub use event_store::{EventStore, EventStoreError};
pub use in_memory_event_store::InMemoryEventStore;
pub use nats_client::{connect as connect_nats, NatsConfig, NatsError};
pub use nats_wait_notifier::{NatsCommandWaitNotifier, NatsWaitSignalListener};
pub use snapshot_policy::SnapshotPolicy;
pub use snapshot_store::{
    AggregateSnapshot, InMemorySnapshotRepository, NoOpSnapshotRepository, SnapshotError,
    SnapshotRepository,
};

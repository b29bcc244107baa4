// Copyright 2025 Cowboy AI, LLC.

//! # CIM Sourcing
//!
//! Event sourcing runtime for the Composable Information Machine.
//!
//! This crate provides the runtime pieces of an event-sourced aggregate:
//! - **Event Store**: Append-only, gapless, versioned streams per aggregate
//! - **State Aggregates**: Typed state rebuilt from snapshots and replayed streams
//! - **Command Processing**: Load, decide, append with conflict retries, publish
//! - **Event Pipeline**: Projections, event handlers and sagas fed by appended streams
//! - **Wait Tracking**: Callers wait for a command to reach a pipeline stage,
//!   across nodes and across the commands a saga spawns
//!
//! ## Wait Model
//!
//! 1. A caller registers a tracker for a command and a target stage
//! 2. The target is propagated in the command header under `wait.*` keys
//! 3. Every stage that runs emits a signal to the propagated endpoint
//! 4. The tracker resolves once, on success, failure or timeout

#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod errors;
pub mod events;
pub mod identifiers;
pub mod infrastructure;
pub mod modeling;
pub mod pipeline;
pub mod wait;

pub use command::{
    CommandBody, CommandBus, CommandError, CommandGateway, CommandHandlers, CommandMessage,
    CommandOutcome, CommandProcessor, InMemoryCommandBus,
};
pub use config::SourcingConfig;
pub use errors::{DomainError, DomainResult, ErrorInfo, ErrorInfoCapable};
pub use events::{DomainEvent, DomainEventBody, DomainEventStream, Header};
pub use identifiers::{AggregateId, NamedAggregate};
pub use infrastructure::{EventStore, EventStoreError, InMemoryEventStore, SnapshotRepository};
pub use modeling::{
    SourcedState, SourcingError, SourcingRegistry, StateAggregate, StateAggregateRepository,
};
pub use pipeline::{DomainEventBus, DomainEventDispatcher, InMemoryDomainEventBus};
pub use wait::{
    CommandStage, FunctionInfo, WaitError, WaitSignal, WaitStrategy, WaitStrategyRegistry,
    WaitingForChain, WaitingForStage,
};

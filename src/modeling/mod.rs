// Copyright 2025 Cowboy AI, LLC.

//! Aggregate state modeling and reconstruction

mod repository;
mod sourcing;
mod state;

pub use repository::StateAggregateRepository;
pub use sourcing::{SourcedState, SourcingRegistry};
pub use state::{SourcingError, StateAggregate};

// Copyright 2025 Cowboy AI, LLC.

//! Event pipeline downstream of the aggregate
//!
//! Appended streams are published on a [`DomainEventBus`] and fanned out by
//! the [`DomainEventDispatcher`] to projections, event handlers and sagas,
//! each reporting its stage back to the command's tracker.

mod bus;
mod dispatcher;

pub use bus::{DomainEventBus, DomainEventReceiver, InMemoryDomainEventBus};
pub use dispatcher::{
    DomainEventDispatcher, EventFunction, EventProcessor, Saga, SagaFunction,
};

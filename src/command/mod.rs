// Copyright 2025 Cowboy AI, LLC.

//! Command side of the pipeline
//!
//! The [`CommandGateway`] registers the caller's tracker and hands the
//! command to a [`CommandBus`]; the [`CommandProcessor`] of the aggregate
//! type loads, decides, appends and publishes.

mod bus;
mod error;
mod gateway;
mod message;
mod processor;

pub use bus::{BusError, CommandBus, CommandReceiver, InMemoryCommandBus};
pub use error::CommandError;
pub use gateway::{CommandGateway, GATEWAY_PROCESSOR};
pub use message::{CommandBody, CommandMessage, DeleteAggregate, RecoverAggregate};
pub use processor::{CommandHandlerFn, CommandHandlers, CommandOutcome, CommandProcessor};

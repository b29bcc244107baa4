// Copyright 2025 Cowboy AI, LLC.

//! Command bus: delivers commands to the processor of their aggregate type

use super::error::CommandError;
use super::message::CommandMessage;
use crate::identifiers::NamedAggregate;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Delivery failures of the in-process buses
#[derive(Debug, Clone, Error)]
pub enum BusError {
    /// Nobody consumes messages for the aggregate type
    #[error("No route for aggregate {0}")]
    NoRoute(NamedAggregate),

    /// The consumer is gone
    #[error("Bus closed: {0}")]
    Closed(String),
}

/// Sends commands towards their processor
#[async_trait]
pub trait CommandBus: Send + Sync + fmt::Debug {
    /// Send a command for processing
    async fn send(&self, command: CommandMessage) -> Result<(), CommandError>;
}

/// Receiving end of one aggregate type's command route
pub type CommandReceiver = mpsc::UnboundedReceiver<CommandMessage>;

/// In-process command bus routing by [`NamedAggregate`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommandBus {
    routes: Arc<RwLock<HashMap<NamedAggregate, mpsc::UnboundedSender<CommandMessage>>>>,
}

impl InMemoryCommandBus {
    /// Create a bus with no routes
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the route of `named_aggregate`, replacing any previous consumer
    pub fn subscribe(&self, named_aggregate: NamedAggregate) -> CommandReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(named_aggregate, sender);
        receiver
    }

    /// Whether a consumer is attached for `named_aggregate`
    pub fn has_route(&self, named_aggregate: &NamedAggregate) -> bool {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(named_aggregate)
    }
}

#[async_trait]
impl CommandBus for InMemoryCommandBus {
    async fn send(&self, command: CommandMessage) -> Result<(), CommandError> {
        let named_aggregate = command.aggregate_id.named_aggregate.clone();
        let sender = self
            .routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&named_aggregate)
            .cloned()
            .ok_or_else(|| BusError::NoRoute(named_aggregate.clone()))?;
        debug!(
            command_id = %command.id,
            command = %command.name,
            aggregate_id = %command.aggregate_id,
            "Send command"
        );
        sender
            .send(command)
            .map_err(|_| BusError::Closed(named_aggregate.to_string()))?;
        Ok(())
    }
}

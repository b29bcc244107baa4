// Copyright 2025 Cowboy AI, LLC.

//! Command processing errors

use super::bus::BusError;
use crate::errors::{codes, DomainError, ErrorInfo, ErrorInfoCapable};
use crate::identifiers::AggregateId;
use crate::infrastructure::EventStoreError;
use crate::modeling::SourcingError;
use crate::wait::WaitError;
use thiserror::Error;

/// Errors raised while sending or processing a command
#[derive(Debug, Clone, Error)]
pub enum CommandError {
    /// A non-create command addressed an aggregate that was never created
    #[error("Aggregate not found: {0}")]
    NotFoundAggregate(AggregateId),

    /// A non-recovery command addressed a deleted aggregate
    #[error("Illegal access to deleted aggregate: {0}")]
    IllegalAccessDeletedAggregate(AggregateId),

    /// No handler is registered for the command name
    #[error("No command handler registered for {0}")]
    HandlerNotFound(String),

    /// Rejected by a command handler
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Error from the event store
    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    /// Error while loading or folding the aggregate
    #[error(transparent)]
    Sourcing(#[from] SourcingError),

    /// The command or its events could not be delivered
    #[error(transparent)]
    Bus(#[from] BusError),

    /// Error while waiting for the command
    #[error(transparent)]
    Wait(#[from] WaitError),
}

impl CommandError {
    /// Whether reloading the aggregate and processing again can succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            CommandError::EventStore(e) => e.is_retryable(),
            CommandError::Sourcing(SourcingError::EventStore(e)) => e.is_retryable(),
            _ => false,
        }
    }
}

impl ErrorInfoCapable for CommandError {
    fn error_code(&self) -> &'static str {
        match self {
            CommandError::NotFoundAggregate(_) => codes::NOT_FOUND_AGGREGATE,
            CommandError::IllegalAccessDeletedAggregate(_) => {
                codes::ILLEGAL_ACCESS_DELETED_AGGREGATE
            }
            CommandError::HandlerNotFound(_) => codes::NOT_FOUND,
            CommandError::Domain(e) => e.error_code(),
            CommandError::EventStore(e) => e.error_code(),
            CommandError::Sourcing(e) => e.error_code(),
            CommandError::Bus(_) => codes::INTERNAL_SERVER_ERROR,
            CommandError::Wait(e) => e.error_code(),
        }
    }

    fn to_error_info(&self) -> ErrorInfo {
        match self {
            CommandError::Domain(e) => e.to_error_info(),
            CommandError::Wait(e) => e.to_error_info(),
            other => ErrorInfo::of(other.error_code(), other.to_string()),
        }
    }
}

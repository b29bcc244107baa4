// Copyright 2025 Cowboy AI, LLC.

//! Error types and stable error identities
//!
//! Every error that can cross the command tracking boundary is reduced to an
//! [`ErrorInfo`] pair so that a remote node can report a failure without
//! losing its identity.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error codes shared by every node of the pipeline
pub mod codes {
    /// Successful completion
    pub const SUCCEEDED: &str = "Ok";
    /// Message paired with [`SUCCEEDED`]
    pub const SUCCEEDED_MESSAGE: &str = "";
    /// Appended stream version is not the tail version + 1
    pub const EVENT_VERSION_CONFLICT: &str = "EventVersionConflict";
    /// A concurrent creator won the race for the initial version
    pub const DUPLICATE_AGGREGATE_ID: &str = "DuplicateAggregateId";
    /// The request was already applied to the aggregate
    pub const DUPLICATE_REQUEST_ID: &str = "DuplicateRequestId";
    /// Corrupted or out-of-order stream detected while folding
    pub const SOURCING_VERSION_CONFLICT: &str = "SourcingVersionConflict";
    /// Command sent to a deleted aggregate
    pub const ILLEGAL_ACCESS_DELETED_AGGREGATE: &str = "IllegalAccessDeletedAggregate";
    /// Command sent to an aggregate that was never created
    pub const NOT_FOUND_AGGREGATE: &str = "NotFoundAggregate";
    /// Generic not found
    pub const NOT_FOUND: &str = "NotFound";
    /// Wait tracker was not completed in time
    pub const REQUEST_TIMEOUT: &str = "RequestTimeout";
    /// Invalid input
    pub const BAD_REQUEST: &str = "BadRequest";
    /// Business rule violated by a command handler
    pub const ILLEGAL_STATE: &str = "IllegalState";
    /// Unclassified failure
    pub const INTERNAL_SERVER_ERROR: &str = "InternalServerError";
}

/// A stable `{error_code, error_msg}` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ErrorInfo {
    /// Stable machine readable code, see [`codes`]
    pub error_code: String,
    /// Human readable message
    pub error_msg: String,
}

impl ErrorInfo {
    /// Create an error info from a code and message
    pub fn of(error_code: impl Into<String>, error_msg: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            error_msg: error_msg.into(),
        }
    }

    /// The successful error info
    pub fn ok() -> Self {
        Self::of(codes::SUCCEEDED, codes::SUCCEEDED_MESSAGE)
    }

    /// Whether this info describes a success
    pub fn succeeded(&self) -> bool {
        self.error_code == codes::SUCCEEDED
    }
}

impl Default for ErrorInfo {
    fn default() -> Self {
        Self::ok()
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.error_code, self.error_msg)
    }
}

/// Conversion of an error into its stable identity
pub trait ErrorInfoCapable: fmt::Display {
    /// Stable error code of this error
    fn error_code(&self) -> &'static str;

    /// Reduce the error to an [`ErrorInfo`]
    fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::of(self.error_code(), self.to_string())
    }
}

/// Errors raised by command handlers and domain rules
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// Aggregate not found
    #[error("Aggregate not found: {0}")]
    AggregateNotFound(String),

    /// Command sent to a deleted aggregate
    #[error("Illegal access to deleted aggregate: {0}")]
    IllegalAccessDeletedAggregate(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Business rule violation
    #[error("Business rule violation: {rule}")]
    BusinessRuleViolation {
        /// Description of the violated rule
        rule: String,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// No handler registered for a message
    #[error("No handler registered for {0}")]
    HandlerNotFound(String),

    /// Error carried by a remote signal
    #[error("{0}")]
    Remote(ErrorInfo),

    /// Generic internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl DomainError {
    /// Create a business rule violation
    pub fn rule(rule: impl Into<String>) -> Self {
        DomainError::BusinessRuleViolation { rule: rule.into() }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::AggregateNotFound(_))
    }

    /// Check if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            DomainError::ValidationError(_) | DomainError::BusinessRuleViolation { .. }
        )
    }
}

impl ErrorInfoCapable for DomainError {
    fn error_code(&self) -> &'static str {
        match self {
            DomainError::AggregateNotFound(_) => codes::NOT_FOUND_AGGREGATE,
            DomainError::IllegalAccessDeletedAggregate(_) => {
                codes::ILLEGAL_ACCESS_DELETED_AGGREGATE
            }
            DomainError::ValidationError(_) | DomainError::SerializationError(_) => {
                codes::BAD_REQUEST
            }
            DomainError::BusinessRuleViolation { .. } => codes::ILLEGAL_STATE,
            DomainError::HandlerNotFound(_) => codes::NOT_FOUND,
            DomainError::Remote(_) | DomainError::InternalError(_) => {
                codes::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn to_error_info(&self) -> ErrorInfo {
        match self {
            DomainError::Remote(info) => info.clone(),
            _ => ErrorInfo::of(self.error_code(), self.to_string()),
        }
    }
}

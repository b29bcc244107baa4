// Copyright 2025 Cowboy AI, LLC.

//! Identifier types for aggregates and messages

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tenant used when none is specified
pub const DEFAULT_TENANT_ID: &str = "(0)";

/// Generate a new globally unique identifier for streams, commands and signals
pub fn generate_global_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The named type of an aggregate within a bounded context
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NamedAggregate {
    /// Bounded context the aggregate belongs to
    pub context_name: String,
    /// Aggregate type name
    pub aggregate_name: String,
}

impl NamedAggregate {
    /// Create a named aggregate
    pub fn new(context_name: impl Into<String>, aggregate_name: impl Into<String>) -> Self {
        Self {
            context_name: context_name.into(),
            aggregate_name: aggregate_name.into(),
        }
    }

    /// Build an aggregate id of this type in the default tenant
    pub fn aggregate_id(&self, id: impl Into<String>) -> AggregateId {
        AggregateId {
            named_aggregate: self.clone(),
            id: id.into(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
        }
    }

    /// Build an aggregate id with a freshly generated id
    pub fn generate_aggregate_id(&self) -> AggregateId {
        self.aggregate_id(generate_global_id())
    }
}

impl fmt::Display for NamedAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.context_name, self.aggregate_name)
    }
}

/// Identity of a single consistency boundary (one event stream)
///
/// Immutable; used as the primary key of the event store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AggregateId {
    /// Aggregate type
    #[serde(flatten)]
    pub named_aggregate: NamedAggregate,
    /// Aggregate identifier, unique per type and tenant
    pub id: String,
    /// Owning tenant
    pub tenant_id: String,
}

impl AggregateId {
    /// Create an aggregate id in an explicit tenant
    pub fn new(
        context_name: impl Into<String>,
        aggregate_name: impl Into<String>,
        id: impl Into<String>,
        tenant_id: impl Into<String>,
    ) -> Self {
        Self {
            named_aggregate: NamedAggregate::new(context_name, aggregate_name),
            id: id.into(),
            tenant_id: tenant_id.into(),
        }
    }

    /// Bounded context name
    pub fn context_name(&self) -> &str {
        &self.named_aggregate.context_name
    }

    /// Aggregate type name
    pub fn aggregate_name(&self) -> &str {
        &self.named_aggregate.aggregate_name
    }

    /// Whether both ids denote the same aggregate type
    pub fn is_same_aggregate_name(&self, other: &AggregateId) -> bool {
        self.named_aggregate == other.named_aggregate
    }
}

impl fmt::Display for AggregateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}@{}",
            self.named_aggregate, self.id, self.tenant_id
        )
    }
}

// Copyright 2025 Cowboy AI, LLC.

//! Command messages

use crate::errors::DomainError;
use crate::events::{now_millis, Header};
use crate::identifiers::{generate_global_id, AggregateId};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A typed command body that can be carried by a [`CommandMessage`]
pub trait CommandBody: Serialize + DeserializeOwned + Send + Sync {
    /// Stable command name, the dispatch tag of command handlers
    const NAME: &'static str;

    /// The command creates its aggregate
    const IS_CREATE: bool = false;

    /// The command may also create its aggregate
    const ALLOW_CREATE: bool = false;

    /// The command brings a deleted aggregate back
    const IS_RECOVERY: bool = false;
}

/// A command addressed to one aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage {
    /// Command id
    pub id: String,
    /// Idempotency key, defaults to the command id
    pub request_id: String,
    /// Target aggregate
    pub aggregate_id: AggregateId,
    /// Command name, see [`CommandBody::NAME`]
    pub name: String,
    /// Serialized body
    pub body: serde_json::Value,
    /// Propagated metadata, including the wait request
    pub header: Header,
    /// See [`CommandBody::IS_CREATE`]
    pub is_create: bool,
    /// See [`CommandBody::ALLOW_CREATE`]
    pub allow_create: bool,
    /// See [`CommandBody::IS_RECOVERY`]
    pub is_recovery: bool,
    /// Creation time in epoch milliseconds
    pub create_time: i64,
}

impl CommandMessage {
    /// Wrap a typed body addressed to `aggregate_id`
    pub fn of<C: CommandBody>(aggregate_id: AggregateId, body: &C) -> Result<Self, DomainError> {
        let id = generate_global_id();
        Ok(Self {
            request_id: id.clone(),
            id,
            aggregate_id,
            name: C::NAME.to_string(),
            body: serde_json::to_value(body)?,
            header: Header::new(),
            is_create: C::IS_CREATE,
            allow_create: C::ALLOW_CREATE,
            is_recovery: C::IS_RECOVERY,
            create_time: now_millis(),
        })
    }

    /// Replace the idempotency key
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Mutable access to the header
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Whether the command carries a body of type `C`
    pub fn is<C: CommandBody>(&self) -> bool {
        self.name == C::NAME
    }

    /// Deserialize the body as `C`
    pub fn body_as<C: CommandBody>(&self) -> Result<C, DomainError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Deletes the target aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeleteAggregate {}

impl CommandBody for DeleteAggregate {
    const NAME: &'static str = "delete_aggregate";
}

/// Recovers a deleted aggregate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoverAggregate {}

impl CommandBody for RecoverAggregate {
    const NAME: &'static str = "recover_aggregate";
    const IS_RECOVERY: bool = true;
}

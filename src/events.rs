// Copyright 2025 Cowboy AI, LLC.

//! Domain events and the versioned event streams persisted by the event store
//!
//! A [`DomainEventStream`] is the unit of persistence: all events produced by
//! one command, stamped with the aggregate version *after* they are applied.

use crate::errors::{DomainError, ErrorInfo};
use crate::identifiers::{generate_global_id, AggregateId};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Version of the first stream of every aggregate
pub const INITIAL_VERSION: u32 = 1;

/// Version of an aggregate before any stream was applied
pub const UNINITIALIZED_VERSION: u32 = 0;

/// Default revision of an event body
pub const DEFAULT_REVISION: &str = "0.0.1";

/// Header key marking a stream that must not be folded onto state
pub const IGNORE_SOURCING_KEY: &str = "sourcing.ignore";

/// Current time in epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Ordered string metadata attached to commands and event streams
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Header(IndexMap<String, String>);

impl Header {
    /// Create an empty header
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key, replacing any previous value
    pub fn with(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.shift_remove(key)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the header has no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every entry whose key starts with `prefix` from `other`
    pub fn copy_prefixed(&mut self, other: &Header, prefix: &str) -> &mut Self {
        for (key, value) in other.iter().filter(|(k, _)| k.starts_with(prefix)) {
            self.with(key, value);
        }
        self
    }

    /// Mark the owning stream as a pure notification
    pub fn with_ignore_sourcing(&mut self) -> &mut Self {
        self.with(IGNORE_SOURCING_KEY, "true")
    }

    /// Whether the owning stream must be skipped by sourcing
    pub fn ignore_sourcing(&self) -> bool {
        self.get(IGNORE_SOURCING_KEY) == Some("true")
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Header {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// A typed event body that can be carried by a [`DomainEvent`]
pub trait DomainEventBody: Serialize + DeserializeOwned + Send + Sync {
    /// Stable event name, the dispatch tag used by sourcing handlers
    const NAME: &'static str;

    /// Schema revision of the body
    const REVISION: &'static str = DEFAULT_REVISION;
}

/// One event inside a [`DomainEventStream`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    /// Event id
    pub id: String,
    /// Event name, see [`DomainEventBody::NAME`]
    pub name: String,
    /// Fully qualified body type
    pub body_type: String,
    /// Position of the event inside its stream, starting at 1
    pub sequence: u32,
    /// Body schema revision
    pub revision: String,
    /// Whether this is the last event of its stream
    pub is_last: bool,
    /// Serialized body
    pub body: serde_json::Value,
}

impl DomainEvent {
    /// Wrap a typed body as a single, last event
    pub fn of<E: DomainEventBody>(body: &E) -> Result<Self, DomainError> {
        Ok(Self {
            id: generate_global_id(),
            name: E::NAME.to_string(),
            body_type: std::any::type_name::<E>().to_string(),
            sequence: 1,
            revision: E::REVISION.to_string(),
            is_last: true,
            body: serde_json::to_value(body)?,
        })
    }

    /// Whether the event carries a body of type `E`
    pub fn is<E: DomainEventBody>(&self) -> bool {
        self.name == E::NAME
    }

    /// Deserialize the body as `E`
    pub fn body_as<E: DomainEventBody>(&self) -> Result<E, DomainError> {
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

/// Marks the aggregate as deleted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateDeleted {}

impl DomainEventBody for AggregateDeleted {
    const NAME: &'static str = "aggregate_deleted";
}

/// Reverts a previous [`AggregateDeleted`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecovered {}

impl DomainEventBody for AggregateRecovered {
    const NAME: &'static str = "aggregate_recovered";
}

/// Failure notification published in place of a real stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOccurred {
    /// Stable error code
    pub error_code: String,
    /// Error message
    pub error_msg: String,
}

impl DomainEventBody for ErrorOccurred {
    const NAME: &'static str = "error_occurred";
}

/// The ordered batch of events one command produced for one aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DomainEventStream {
    /// Stream id
    pub id: String,
    /// Owning aggregate
    pub aggregate_id: AggregateId,
    /// Aggregate version after applying this stream
    pub version: u32,
    /// Command that produced the stream
    pub command_id: String,
    /// Idempotency key of the request that produced the stream
    pub request_id: String,
    /// Creation time in epoch milliseconds
    pub create_time: i64,
    /// Propagated metadata
    pub header: Header,
    /// Events in sequence order
    pub body: Vec<DomainEvent>,
}

impl DomainEventStream {
    /// Start building a stream for `aggregate_id` at `version`
    pub fn builder(aggregate_id: AggregateId, version: u32) -> DomainEventStreamBuilder {
        DomainEventStreamBuilder::new(aggregate_id, version)
    }

    /// Build a pure failure notification that sourcing skips
    pub fn error_stream(
        aggregate_id: AggregateId,
        version: u32,
        command_id: impl Into<String>,
        request_id: impl Into<String>,
        error: &ErrorInfo,
    ) -> Result<Self, DomainError> {
        let mut builder = Self::builder(aggregate_id, version)
            .command(command_id, request_id)
            .event(&ErrorOccurred {
                error_code: error.error_code.clone(),
                error_msg: error.error_msg.clone(),
            })?;
        builder.header_mut().with_ignore_sourcing();
        Ok(builder.build())
    }

    /// Whether this stream must not be folded onto state
    pub fn ignore_sourcing(&self) -> bool {
        self.header.ignore_sourcing()
    }

    /// Whether this stream creates its aggregate
    pub fn is_initial_version(&self) -> bool {
        self.version == INITIAL_VERSION
    }

    /// Number of events
    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Iterate events in sequence order
    pub fn iter(&self) -> std::slice::Iter<'_, DomainEvent> {
        self.body.iter()
    }
}

impl<'a> IntoIterator for &'a DomainEventStream {
    type Item = &'a DomainEvent;
    type IntoIter = std::slice::Iter<'a, DomainEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.body.iter()
    }
}

/// Builder assigning event sequences and the `is_last` marker
#[derive(Debug)]
pub struct DomainEventStreamBuilder {
    aggregate_id: AggregateId,
    version: u32,
    command_id: String,
    request_id: String,
    create_time: Option<i64>,
    header: Header,
    body: Vec<DomainEvent>,
}

impl DomainEventStreamBuilder {
    fn new(aggregate_id: AggregateId, version: u32) -> Self {
        let command_id = generate_global_id();
        Self {
            aggregate_id,
            version,
            request_id: command_id.clone(),
            command_id,
            create_time: None,
            header: Header::new(),
            body: Vec::new(),
        }
    }

    /// Set the originating command and request ids
    pub fn command(mut self, command_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        self.command_id = command_id.into();
        self.request_id = request_id.into();
        self
    }

    /// Replace the header
    pub fn header(mut self, header: Header) -> Self {
        self.header = header;
        self
    }

    /// Mutable access to the header
    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    /// Override the creation time
    pub fn create_time(mut self, create_time: i64) -> Self {
        self.create_time = Some(create_time);
        self
    }

    /// Append a typed event
    pub fn event<E: DomainEventBody>(mut self, body: &E) -> Result<Self, DomainError> {
        self.body.push(DomainEvent::of(body)?);
        Ok(self)
    }

    /// Append an already wrapped event
    pub fn raw_event(mut self, event: DomainEvent) -> Self {
        self.body.push(event);
        self
    }

    /// Finish the stream
    pub fn build(self) -> DomainEventStream {
        let count = self.body.len();
        let body = self
            .body
            .into_iter()
            .enumerate()
            .map(|(index, mut event)| {
                event.sequence = index as u32 + 1;
                event.is_last = index + 1 == count;
                event
            })
            .collect();
        DomainEventStream {
            id: generate_global_id(),
            aggregate_id: self.aggregate_id,
            version: self.version,
            command_id: self.command_id,
            request_id: self.request_id,
            create_time: self.create_time.unwrap_or_else(now_millis),
            header: self.header,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::NamedAggregate;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct ItemAdded {
        sku: String,
    }

    impl DomainEventBody for ItemAdded {
        const NAME: &'static str = "item_added";
    }

    fn aggregate_id() -> AggregateId {
        NamedAggregate::new("sales", "cart").aggregate_id("c-1")
    }

    #[test]
    fn test_builder_assigns_sequences_and_last_marker() {
        let stream = DomainEventStream::builder(aggregate_id(), 3)
            .command("cmd-1", "req-1")
            .event(&ItemAdded { sku: "a".into() })
            .unwrap()
            .event(&ItemAdded { sku: "b".into() })
            .unwrap()
            .build();

        assert_eq!(stream.version, 3);
        assert_eq!(stream.command_id, "cmd-1");
        assert_eq!(stream.request_id, "req-1");
        let sequences: Vec<_> = stream.iter().map(|e| (e.sequence, e.is_last)).collect();
        assert_eq!(sequences, vec![(1, false), (2, true)]);
        assert!(stream.body[0].is::<ItemAdded>());
        assert_eq!(
            stream.body[1].body_as::<ItemAdded>().unwrap(),
            ItemAdded { sku: "b".into() }
        );
    }

    #[test]
    fn test_error_stream_ignores_sourcing() {
        let error = ErrorInfo::of("E1", "boom");
        let stream =
            DomainEventStream::error_stream(aggregate_id(), 1, "cmd", "req", &error).unwrap();
        assert!(stream.ignore_sourcing());
        assert!(stream.body[0].is::<ErrorOccurred>());
    }

    #[test]
    fn test_stream_wire_shape() {
        let stream = DomainEventStream::builder(aggregate_id(), 1)
            .create_time(1_000)
            .event(&ItemAdded { sku: "a".into() })
            .unwrap()
            .build();
        let json = serde_json::to_value(&stream).unwrap();
        assert_eq!(json["aggregateId"]["contextName"], "sales");
        assert_eq!(json["version"], 1);
        assert_eq!(json["createTime"], 1_000);
        assert_eq!(json["body"][0]["name"], "item_added");
        assert_eq!(json["body"][0]["revision"], DEFAULT_REVISION);
        let back: DomainEventStream = serde_json::from_value(json).unwrap();
        assert_eq!(back, stream);
    }

    #[test]
    fn test_header_prefix_copy() {
        let source: Header = [("wait.stage", "PROCESSED"), ("other", "x")]
            .into_iter()
            .collect();
        let mut target = Header::new();
        target.copy_prefixed(&source, "wait.");
        assert_eq!(target.get("wait.stage"), Some("PROCESSED"));
        assert!(!target.contains_key("other"));
    }
}

// Copyright 2025 Cowboy AI, LLC.

//! Materialized wait targets and their encoding into message headers
//!
//! A command may be processed on another node than the one tracking it, so
//! the wait target travels in the command header under the `wait.` key
//! namespace. Decoding is lenient: a missing stage or an unknown chain kind
//! means no wait was requested.

use super::function::FunctionInfo;
use super::signal::WaitSignal;
use super::stage::CommandStage;
use super::waiting::{WaitError, WaitOutcome};
use crate::events::Header;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Prefix shared by every wait header key
pub const WAIT_PREFIX: &str = "wait.";
/// Root command whose tracker receives the signals
pub const WAIT_COMMAND_ID: &str = "wait.command_id";
/// Endpoint signals must be sent to
pub const WAIT_ENDPOINT: &str = "wait.endpoint";
/// Awaited stage
pub const WAIT_STAGE: &str = "wait.stage";
/// Awaited function context
pub const WAIT_FUNCTION_CONTEXT: &str = "wait.function.context";
/// Awaited function processor
pub const WAIT_FUNCTION_PROCESSOR: &str = "wait.function.processor";
/// Awaited function name
pub const WAIT_FUNCTION_NAME: &str = "wait.function.name";
/// Chain discriminant
pub const WAIT_CHAIN: &str = "wait.chain";
/// Tail stage of a chain
pub const WAIT_CHAIN_TAIL_STAGE: &str = "wait.chain.tail.stage";
/// Tail function context of a chain
pub const WAIT_CHAIN_TAIL_CONTEXT: &str = "wait.chain.tail.context";
/// Tail function processor of a chain
pub const WAIT_CHAIN_TAIL_PROCESSOR: &str = "wait.chain.tail.processor";
/// Tail function name of a chain
pub const WAIT_CHAIN_TAIL_FUNCTION: &str = "wait.chain.tail.function";
/// Discriminant of [`ChainTarget`]
pub const SIMPLE_CHAIN: &str = "simple";

/// Kind of message a downstream command is derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    /// Dispatched while handling a command
    Command,
    /// Dispatched by a saga reacting to a domain event
    DomainEvent,
}

/// Wait for one stage, optionally filtered by function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StageTarget {
    /// Awaited stage
    pub stage: CommandStage,
    /// Function filter, wildcard fields match anything
    pub function: FunctionInfo,
}

impl StageTarget {
    /// Create a target
    pub fn new(stage: CommandStage, function: FunctionInfo) -> Self {
        Self { stage, function }
    }

    /// Whether a node processing `processing_stage` must emit a signal
    pub fn should_notify(&self, processing_stage: CommandStage) -> bool {
        self.stage.should_notify(processing_stage)
    }

    /// Whether `signal` is relevant to this target at all
    pub fn should_notify_signal(&self, signal: &WaitSignal) -> bool {
        self.stage.is_previous(signal.stage)
            || (self.stage == signal.stage && self.function.matches(&signal.function))
    }

    /// Outcome `signal` resolves this target to, if any
    ///
    /// An error at a previous stage fails the wait. A matching signal at the
    /// target stage resolves it; at `PROJECTED` only the last projection does.
    pub fn outcome(&self, signal: &WaitSignal) -> Option<WaitOutcome> {
        if self.stage.is_previous(signal.stage) {
            return (!signal.succeeded()).then(|| Err(WaitError::Failed(Box::new(signal.clone()))));
        }
        if self.stage != signal.stage || !self.function.matches(&signal.function) {
            return None;
        }
        if !signal.succeeded() {
            return Some(Err(WaitError::Failed(Box::new(signal.clone()))));
        }
        if self.stage == CommandStage::Projected && !signal.is_last_projection {
            return None;
        }
        Some(Ok(signal.clone()))
    }
}

/// Wait for a saga at `SAGA_HANDLED`, then for `tail` on every command it spawned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChainTarget {
    /// Saga function filter of the main node
    pub function: FunctionInfo,
    /// Target of every downstream command
    pub tail: StageTarget,
}

impl ChainTarget {
    /// Create a chain target
    pub fn new(function: FunctionInfo, tail: StageTarget) -> Self {
        Self { function, tail }
    }

    /// Target of the main node
    pub fn main(&self) -> StageTarget {
        StageTarget::new(CommandStage::SagaHandled, self.function.clone())
    }
}

/// Serializable descriptor of what a tracker awaits
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Materialized {
    /// Simple stage wait
    Stage(StageTarget),
    /// Two-level chain wait
    Chain(ChainTarget),
}

/// Wait request decoded from a message header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedWaitStrategy {
    /// Endpoint signals must be sent to
    pub endpoint: String,
    /// Tracker the signals are routed to
    pub wait_command_id: String,
    /// Awaited target
    pub materialized: Materialized,
}

impl Materialized {
    /// Stage of the (main) target
    pub fn stage(&self) -> CommandStage {
        match self {
            Materialized::Stage(target) => target.stage,
            Materialized::Chain(_) => CommandStage::SagaHandled,
        }
    }

    /// Whether a node processing `processing_stage` must emit a signal
    pub fn should_notify(&self, processing_stage: CommandStage) -> bool {
        self.stage().should_notify(processing_stage)
    }

    /// Whether `signal` is relevant to the (main) target
    pub fn should_notify_signal(&self, signal: &WaitSignal) -> bool {
        match self {
            Materialized::Stage(target) => target.should_notify_signal(signal),
            Materialized::Chain(target) => target.main().should_notify_signal(signal),
        }
    }

    /// Target carried by a command derived from an `upstream` message, if any
    ///
    /// A stage wait follows commands derived from commands. A chain follows
    /// itself through commands and degrades to its tail for saga-emitted
    /// commands.
    pub fn propagated(&self, upstream: UpstreamKind) -> Option<Materialized> {
        match (self, upstream) {
            (Materialized::Stage(_), UpstreamKind::Command) => Some(self.clone()),
            (Materialized::Stage(_), UpstreamKind::DomainEvent) => None,
            (Materialized::Chain(_), UpstreamKind::Command) => Some(self.clone()),
            (Materialized::Chain(target), UpstreamKind::DomainEvent) => {
                Some(Materialized::Stage(target.tail.clone()))
            }
        }
    }

    /// Write the target into `header`, replacing any previous wait keys
    pub fn propagate(&self, header: &mut Header, endpoint: &str, wait_command_id: &str) {
        clear(header);
        header
            .with(WAIT_ENDPOINT, endpoint)
            .with(WAIT_COMMAND_ID, wait_command_id)
            .with(WAIT_STAGE, self.stage().as_str());
        match self {
            Materialized::Stage(target) => {
                write_function(
                    header,
                    &target.function,
                    [WAIT_FUNCTION_CONTEXT, WAIT_FUNCTION_PROCESSOR, WAIT_FUNCTION_NAME],
                );
            }
            Materialized::Chain(target) => {
                write_function(
                    header,
                    &target.function,
                    [WAIT_FUNCTION_CONTEXT, WAIT_FUNCTION_PROCESSOR, WAIT_FUNCTION_NAME],
                );
                header
                    .with(WAIT_CHAIN, SIMPLE_CHAIN)
                    .with(WAIT_CHAIN_TAIL_STAGE, target.tail.stage.as_str());
                write_function(
                    header,
                    &target.tail.function,
                    [
                        WAIT_CHAIN_TAIL_CONTEXT,
                        WAIT_CHAIN_TAIL_PROCESSOR,
                        WAIT_CHAIN_TAIL_FUNCTION,
                    ],
                );
            }
        }
    }

    /// Decode the wait request carried by `header`
    pub fn extract(header: &Header) -> Option<ExtractedWaitStrategy> {
        let endpoint = header.get(WAIT_ENDPOINT)?;
        let wait_command_id = header.get(WAIT_COMMAND_ID)?;
        let stage = header.get(WAIT_STAGE)?.parse::<CommandStage>().ok()?;
        let function = read_function(
            header,
            [WAIT_FUNCTION_CONTEXT, WAIT_FUNCTION_PROCESSOR, WAIT_FUNCTION_NAME],
        );

        let materialized = match header.get(WAIT_CHAIN) {
            None => Materialized::Stage(StageTarget::new(stage, function)),
            Some(SIMPLE_CHAIN) => {
                let tail_stage = header.get(WAIT_CHAIN_TAIL_STAGE)?.parse::<CommandStage>().ok()?;
                let tail_function = read_function(
                    header,
                    [
                        WAIT_CHAIN_TAIL_CONTEXT,
                        WAIT_CHAIN_TAIL_PROCESSOR,
                        WAIT_CHAIN_TAIL_FUNCTION,
                    ],
                );
                Materialized::Chain(ChainTarget::new(
                    function,
                    StageTarget::new(tail_stage, tail_function),
                ))
            }
            Some(kind) => {
                debug!(kind, "Unknown wait chain kind, no wait extracted");
                return None;
            }
        };

        Some(ExtractedWaitStrategy {
            endpoint: endpoint.to_string(),
            wait_command_id: wait_command_id.to_string(),
            materialized,
        })
    }
}

impl ExtractedWaitStrategy {
    /// Propagate this wait into the header of a derived command
    ///
    /// Returns `false`, leaving `header` untouched, when the wait does not
    /// follow this kind of upstream.
    pub fn propagate_to(&self, header: &mut Header, upstream: UpstreamKind) -> bool {
        match self.materialized.propagated(upstream) {
            Some(materialized) => {
                materialized.propagate(header, &self.endpoint, &self.wait_command_id);
                true
            }
            None => false,
        }
    }
}

fn clear(header: &mut Header) {
    let keys: Vec<String> = header
        .iter()
        .filter(|(key, _)| key.starts_with(WAIT_PREFIX))
        .map(|(key, _)| key.to_string())
        .collect();
    for key in keys {
        header.remove(&key);
    }
}

fn write_function(header: &mut Header, function: &FunctionInfo, keys: [&str; 3]) {
    let [context, processor, name] = keys;
    for (key, value) in [
        (context, &function.context_name),
        (processor, &function.processor_name),
        (name, &function.name),
    ] {
        if !value.is_empty() {
            header.with(key, value.as_str());
        }
    }
}

fn read_function(header: &Header, keys: [&str; 3]) -> FunctionInfo {
    let [context, processor, name] = keys;
    FunctionInfo::new(
        header.get(context).unwrap_or_default(),
        header.get(processor).unwrap_or_default(),
        header.get(name).unwrap_or_default(),
    )
}

// Copyright 2025 Cowboy AI, LLC.

//! Command processor: load, decide, append, publish
//!
//! One processor serves one aggregate type. Each command reloads its
//! aggregate, runs the registered handler against the current state and
//! appends the resulting stream. A lost append race reloads and retries; a
//! repeated request id is acknowledged without producing events again.

use super::bus::CommandReceiver;
use super::error::CommandError;
use super::message::{CommandBody, CommandMessage, DeleteAggregate, RecoverAggregate};
use crate::config::SourcingConfig;
use crate::errors::{DomainError, ErrorInfo, ErrorInfoCapable};
use crate::events::{AggregateDeleted, AggregateRecovered, DomainEvent, DomainEventStream};
use crate::infrastructure::{EventStoreError, SnapshotPolicy};
use crate::modeling::{SourcedState, StateAggregate, StateAggregateRepository};
use crate::pipeline::DomainEventBus;
use crate::wait::{CommandStage, FunctionInfo, WaitSignal, WaitSignalEmitter};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Type-erased command handler
pub type CommandHandlerFn<S> =
    Arc<dyn Fn(&S, &CommandMessage) -> Result<Vec<DomainEvent>, DomainError> + Send + Sync>;

/// Command handlers of one state type, keyed by command name
pub struct CommandHandlers<S> {
    handlers: HashMap<&'static str, CommandHandlerFn<S>>,
}

impl<S> Default for CommandHandlers<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S> fmt::Debug for CommandHandlers<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<_> = self.handlers.keys().collect();
        commands.sort();
        f.debug_struct("CommandHandlers")
            .field("commands", &commands)
            .finish()
    }
}

impl<S: 'static> CommandHandlers<S> {
    /// Create an empty handler set
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler of command `C`
    ///
    /// The handler decides from the current state alone and returns the
    /// events to append, in order.
    pub fn on<C, F>(mut self, handler: F) -> Self
    where
        C: CommandBody + 'static,
        F: Fn(&S, C) -> Result<Vec<DomainEvent>, DomainError> + Send + Sync + 'static,
    {
        self.handlers.insert(
            C::NAME,
            Arc::new(move |state: &S, command: &CommandMessage| {
                let body = command.body_as::<C>()?;
                handler(state, body)
            }),
        );
        self
    }

    /// Whether a handler is registered for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<&CommandHandlerFn<S>> {
        self.handlers.get(name)
    }
}

/// What processing a command resulted in
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    /// The stream was appended
    Applied(DomainEventStream),
    /// The request id was already applied; nothing was appended
    AlreadyProcessed,
}

/// Processes the commands of state type `S`
pub struct CommandProcessor<S: SourcedState> {
    repository: StateAggregateRepository<S>,
    handlers: CommandHandlers<S>,
    event_bus: Arc<dyn DomainEventBus>,
    emitter: WaitSignalEmitter,
    snapshot_policy: SnapshotPolicy,
    max_conflict_retries: u32,
}

impl<S: SourcedState> fmt::Debug for CommandProcessor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandProcessor")
            .field("aggregate", &S::named_aggregate())
            .field("handlers", &self.handlers)
            .field("snapshot_policy", &self.snapshot_policy)
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish()
    }
}

impl<S: SourcedState> CommandProcessor<S> {
    /// Create a processor with the default snapshot policy and retry budget
    pub fn new(
        repository: StateAggregateRepository<S>,
        handlers: CommandHandlers<S>,
        event_bus: Arc<dyn DomainEventBus>,
        emitter: WaitSignalEmitter,
    ) -> Self {
        let defaults = SourcingConfig::default();
        Self {
            repository,
            handlers,
            event_bus,
            emitter,
            snapshot_policy: defaults.snapshot.policy(),
            max_conflict_retries: defaults.command.max_conflict_retries,
        }
    }

    /// Apply the command and snapshot settings of `config`
    pub fn configure(mut self, config: &SourcingConfig) -> Self {
        self.snapshot_policy = config.snapshot.policy();
        self.max_conflict_retries = config.command.max_conflict_retries;
        self
    }

    /// Replace the snapshot policy
    pub fn with_snapshot_policy(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot_policy = policy;
        self
    }

    /// Replace the number of reload-and-retry attempts after a conflict
    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Repository the processor loads from
    pub fn repository(&self) -> &StateAggregateRepository<S> {
        &self.repository
    }

    /// Function identity of the handler of `command`
    pub fn function(&self, command: &CommandMessage) -> FunctionInfo {
        let named = S::named_aggregate();
        FunctionInfo::new(named.context_name, named.aggregate_name, command.name.clone())
    }

    /// Process one command and emit its `PROCESSED` and `SNAPSHOT` signals
    pub async fn process(&self, command: &CommandMessage) -> Result<CommandOutcome, CommandError> {
        let mut attempt = 0;
        let result = loop {
            match self.decide_and_append(command).await {
                Err(error) if error.is_retryable() && attempt < self.max_conflict_retries => {
                    attempt += 1;
                    warn!(
                        command_id = %command.id,
                        aggregate_id = %command.aggregate_id,
                        attempt,
                        error = %error,
                        "Lost append race, reloading aggregate"
                    );
                }
                Err(CommandError::EventStore(EventStoreError::DuplicateRequestId {
                    request_id,
                    ..
                })) => {
                    info!(
                        command_id = %command.id,
                        aggregate_id = %command.aggregate_id,
                        request_id = %request_id,
                        "Request already processed"
                    );
                    break Ok(None);
                }
                other => break other.map(Some),
            }
        };

        match result {
            Ok(Some((aggregate, stream))) => {
                self.emit_processed(command, Some(stream.version), None).await;
                if let Err(e) = self.event_bus.publish(stream.clone()).await {
                    error!(
                        aggregate_id = %stream.aggregate_id,
                        version = stream.version,
                        error = %e,
                        "Appended stream could not be published"
                    );
                }
                self.snapshot(command, &aggregate).await;
                Ok(CommandOutcome::Applied(stream))
            }
            Ok(None) => {
                self.emit_processed(command, None, None).await;
                Ok(CommandOutcome::AlreadyProcessed)
            }
            Err(error) => {
                warn!(
                    command_id = %command.id,
                    aggregate_id = %command.aggregate_id,
                    error = %error,
                    "Command rejected"
                );
                self.emit_processed(command, None, Some(error.to_error_info()))
                    .await;
                Err(error)
            }
        }
    }

    /// Process every command received on `receiver`, each in its own task
    pub fn spawn(self: Arc<Self>, mut receiver: CommandReceiver) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(command) = receiver.recv().await {
                let processor = Arc::clone(&self);
                tokio::spawn(async move {
                    // Failures are already logged and signalled
                    let _ = processor.process(&command).await;
                });
            }
            debug!(aggregate = %S::named_aggregate(), "Command route closed");
        })
    }

    async fn decide_and_append(
        &self,
        command: &CommandMessage,
    ) -> Result<(StateAggregate<S>, DomainEventStream), CommandError> {
        let mut aggregate = self.repository.load(&command.aggregate_id).await?;
        self.check(command, &aggregate)?;

        let events = self.decide(command, &aggregate)?;
        if events.is_empty() {
            return Err(DomainError::ValidationError(format!(
                "command {} produced no events",
                command.name
            ))
            .into());
        }

        let mut builder = DomainEventStream::builder(
            command.aggregate_id.clone(),
            aggregate.expected_next_version(),
        )
        .command(command.id.clone(), command.request_id.clone())
        .header(command.header.clone());
        for event in events {
            builder = builder.raw_event(event);
        }
        let stream = builder.build();

        // Events that cannot be sourced never reach the store
        aggregate.on_sourcing(&stream)?;
        self.repository
            .event_store()
            .append(stream.clone())
            .await?;
        Ok((aggregate, stream))
    }

    fn check(
        &self,
        command: &CommandMessage,
        aggregate: &StateAggregate<S>,
    ) -> Result<(), CommandError> {
        if !aggregate.initialized() {
            if command.is_create || command.allow_create {
                return Ok(());
            }
            return Err(CommandError::NotFoundAggregate(command.aggregate_id.clone()));
        }
        if command.is_create {
            return Err(EventStoreError::DuplicateAggregateId {
                aggregate_id: command.aggregate_id.clone(),
            }
            .into());
        }
        if aggregate.deleted() && !command.is_recovery {
            return Err(CommandError::IllegalAccessDeletedAggregate(
                command.aggregate_id.clone(),
            ));
        }
        Ok(())
    }

    fn decide(
        &self,
        command: &CommandMessage,
        aggregate: &StateAggregate<S>,
    ) -> Result<Vec<DomainEvent>, CommandError> {
        if let Some(handler) = self.handlers.get(&command.name) {
            return Ok(handler(aggregate.state(), command)?);
        }
        if command.is::<DeleteAggregate>() {
            return Ok(vec![DomainEvent::of(&AggregateDeleted {})?]);
        }
        if command.is::<RecoverAggregate>() {
            if !aggregate.deleted() {
                return Err(DomainError::rule(format!(
                    "{} is not deleted",
                    command.aggregate_id
                ))
                .into());
            }
            return Ok(vec![DomainEvent::of(&AggregateRecovered {})?]);
        }
        Err(CommandError::HandlerNotFound(command.name.clone()))
    }

    async fn snapshot(&self, command: &CommandMessage, aggregate: &StateAggregate<S>) {
        if !self.snapshot_policy.enabled {
            return;
        }
        let snapshot_version = match self
            .repository
            .snapshots()
            .version(aggregate.aggregate_id())
            .await
        {
            Ok(version) => version,
            Err(e) => {
                warn!(
                    aggregate_id = %aggregate.aggregate_id(),
                    error = %e,
                    "Snapshot version unavailable"
                );
                return;
            }
        };
        if !self
            .snapshot_policy
            .should_snapshot(snapshot_version, aggregate.version())
        {
            return;
        }

        let error = match self.repository.save_snapshot(aggregate).await {
            Ok(()) => {
                debug!(
                    aggregate_id = %aggregate.aggregate_id(),
                    version = aggregate.version(),
                    "Saved snapshot"
                );
                None
            }
            Err(e) => {
                warn!(
                    aggregate_id = %aggregate.aggregate_id(),
                    version = aggregate.version(),
                    error = %e,
                    "Snapshot failed"
                );
                Some(e.to_error_info())
            }
        };
        let mut signal = WaitSignal::builder(
            command.id.clone(),
            command.aggregate_id.clone(),
            CommandStage::Snapshot,
        )
        .function(self.function(command))
        .aggregate_version(aggregate.version());
        if let Some(error) = &error {
            signal = signal.error(error);
        }
        self.emitter.emit(&command.header, signal).await;
    }

    async fn emit_processed(
        &self,
        command: &CommandMessage,
        version: Option<u32>,
        error: Option<ErrorInfo>,
    ) {
        let mut signal = WaitSignal::builder(
            command.id.clone(),
            command.aggregate_id.clone(),
            CommandStage::Processed,
        )
        .function(self.function(command));
        if let Some(version) = version {
            signal = signal.aggregate_version(version);
        }
        if let Some(error) = &error {
            signal = signal.error(error);
        }
        self.emitter.emit(&command.header, signal).await;
    }
}

// Copyright 2025 Cowboy AI, LLC.

//! Command gateway: send a command and wait for the stage it must reach

use super::bus::CommandBus;
use super::error::CommandError;
use super::message::CommandMessage;
use crate::config::WaitConfig;
use crate::wait::{
    CommandStage, FunctionInfo, WaitError, WaitSignal, WaitSignalEmitter, WaitStrategy,
    WaitStrategyRegistry, WaitingForStage,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Function identity of the `SENT` signal
pub const GATEWAY_PROCESSOR: &str = "command_gateway";

/// Fails the tracker when the waiting future is dropped before it resolves
struct CancelOnDrop(Arc<dyn WaitStrategy>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        let wait_command_id = self.0.wait_command_id().to_string();
        if self.0.fail(WaitError::Cancelled(wait_command_id.clone())) {
            debug!(wait_command_id = %wait_command_id, "Wait cancelled by caller");
        }
    }
}

/// Entry point of commands into the pipeline
#[derive(Debug, Clone)]
pub struct CommandGateway {
    bus: Arc<dyn CommandBus>,
    registry: WaitStrategyRegistry,
    emitter: WaitSignalEmitter,
    config: WaitConfig,
}

impl CommandGateway {
    /// Create a gateway tracking waits in `registry`
    pub fn new(
        bus: Arc<dyn CommandBus>,
        registry: WaitStrategyRegistry,
        emitter: WaitSignalEmitter,
        config: WaitConfig,
    ) -> Self {
        Self {
            bus,
            registry,
            emitter,
            config,
        }
    }

    /// Registry holding the trackers of this gateway
    pub fn registry(&self) -> &WaitStrategyRegistry {
        &self.registry
    }

    /// Send without waiting
    pub async fn send(&self, command: CommandMessage) -> Result<(), CommandError> {
        self.bus.send(command).await
    }

    /// Send and wait until the aggregate processed the command
    pub async fn send_and_wait_for_processed(
        &self,
        command: CommandMessage,
    ) -> Result<WaitSignal, CommandError> {
        let strategy = Arc::new(WaitingForStage::processed(command.id.clone()));
        self.send_and_wait(command, strategy, None).await
    }

    /// Send `command` and wait until `strategy` resolves
    ///
    /// The strategy must track this command. It is registered for the
    /// duration of the wait and unregistered when it resolves, fails, times
    /// out or the returned future is dropped. `timeout` defaults to [`WaitConfig::default_timeout_ms`].
    pub async fn send_and_wait(
        &self,
        mut command: CommandMessage,
        strategy: Arc<dyn WaitStrategy>,
        timeout: Option<Duration>,
    ) -> Result<WaitSignal, CommandError> {
        if strategy.wait_command_id() != command.id {
            return Err(WaitError::IllegalState(format!(
                "strategy tracks {} but command is {}",
                strategy.wait_command_id(),
                command.id
            ))
            .into());
        }
        if self.registry.register(Arc::clone(&strategy)).is_some() {
            return Err(WaitError::AlreadyRegistered(command.id.clone()).into());
        }
        let registry = self.registry.clone();
        let wait_command_id = command.id.clone();
        if let Err(e) = strategy.on_finally(Box::new(move || {
            registry.unregister(&wait_command_id);
        })) {
            self.registry.unregister(&command.id);
            return Err(e.into());
        }
        let _cancel = CancelOnDrop(Arc::clone(&strategy));

        let command_id = command.id.clone();
        strategy
            .materialized()
            .propagate(&mut command.header, &self.config.endpoint, &command_id);
        let header = command.header.clone();
        let aggregate_id = command.aggregate_id.clone();
        let function = FunctionInfo::processor(aggregate_id.context_name(), GATEWAY_PROCESSOR);

        if let Err(e) = self.bus.send(command).await {
            strategy.fail(WaitError::Transport(e.to_string()));
            return Err(e);
        }
        self.emitter
            .emit(
                &header,
                WaitSignal::builder(command_id.clone(), aggregate_id, CommandStage::Sent)
                    .function(function),
            )
            .await;

        let timeout = timeout.unwrap_or_else(|| self.config.default_timeout());
        match tokio::time::timeout(timeout, strategy.wait()).await {
            Ok(outcome) => {
                debug!(
                    wait_command_id = %command_id,
                    succeeded = outcome.is_ok(),
                    "Wait resolved"
                );
                Ok(outcome?)
            }
            Err(_) => {
                let error = WaitError::Timeout {
                    wait_command_id: command_id.clone(),
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                };
                warn!(wait_command_id = %command_id, error = %error, "Wait timed out");
                strategy.fail(error.clone());
                Err(error.into())
            }
        }
    }
}

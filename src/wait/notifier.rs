// Copyright 2025 Cowboy AI, LLC.

//! Delivery of wait signals to the node tracking a command

use super::propagation::Materialized;
use super::registry::WaitStrategyRegistry;
use super::signal::WaitSignalBuilder;
use super::waiting::WaitError;
use super::WaitSignal;
use crate::events::Header;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends signals to a wait endpoint
#[async_trait]
pub trait CommandWaitNotifier: Send + Sync + fmt::Debug {
    /// Deliver `signal` to `endpoint`
    async fn notify(&self, endpoint: &str, signal: WaitSignal) -> Result<(), WaitError>;

    /// Deliver `signal`, logging instead of returning delivery failures
    async fn notify_and_forget(&self, endpoint: &str, signal: WaitSignal) {
        let wait_command_id = signal.wait_command_id.clone();
        let stage = signal.stage;
        if let Err(error) = self.notify(endpoint, signal).await {
            warn!(
                endpoint,
                wait_command_id = %wait_command_id,
                stage = %stage,
                error = %error,
                "Failed to deliver wait signal"
            );
        }
    }
}

/// Delivers signals into the registry of this node
#[derive(Debug, Clone)]
pub struct LocalCommandWaitNotifier {
    registry: WaitStrategyRegistry,
}

impl LocalCommandWaitNotifier {
    /// Create a notifier feeding `registry`
    pub fn new(registry: WaitStrategyRegistry) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl CommandWaitNotifier for LocalCommandWaitNotifier {
    async fn notify(&self, _endpoint: &str, signal: WaitSignal) -> Result<(), WaitError> {
        self.registry.notify(signal);
        Ok(())
    }
}

/// Local delivery for the local endpoint, remote delivery otherwise
#[derive(Debug, Clone)]
pub struct CompositeCommandWaitNotifier {
    local_endpoint: String,
    local: LocalCommandWaitNotifier,
    remote: Option<Arc<dyn CommandWaitNotifier>>,
}

impl CompositeCommandWaitNotifier {
    /// Create a composite notifier; without `remote` foreign endpoints are unreachable
    pub fn new(
        local_endpoint: impl Into<String>,
        local: LocalCommandWaitNotifier,
        remote: Option<Arc<dyn CommandWaitNotifier>>,
    ) -> Self {
        Self {
            local_endpoint: local_endpoint.into(),
            local,
            remote,
        }
    }

    /// Endpoint served by this node
    pub fn local_endpoint(&self) -> &str {
        &self.local_endpoint
    }
}

#[async_trait]
impl CommandWaitNotifier for CompositeCommandWaitNotifier {
    async fn notify(&self, endpoint: &str, signal: WaitSignal) -> Result<(), WaitError> {
        if endpoint == self.local_endpoint {
            return self.local.notify(endpoint, signal).await;
        }
        match &self.remote {
            Some(remote) => remote.notify(endpoint, signal).await,
            None => Err(WaitError::Transport(format!(
                "no remote notifier for endpoint {endpoint}"
            ))),
        }
    }
}

/// Emits stage signals for the wait request carried by a message header
#[derive(Debug, Clone)]
pub struct WaitSignalEmitter {
    notifier: Arc<dyn CommandWaitNotifier>,
}

impl WaitSignalEmitter {
    /// Create an emitter sending through `notifier`
    pub fn new(notifier: Arc<dyn CommandWaitNotifier>) -> Self {
        Self { notifier }
    }

    /// Emit the signal under construction if the header requests it
    ///
    /// Nothing is sent when the header carries no wait, when the awaited
    /// stage does not care about the processing stage, or when the signal
    /// is irrelevant to the awaited function. Returns whether it was sent.
    pub async fn emit(&self, header: &Header, signal: WaitSignalBuilder) -> bool {
        let Some(extracted) = Materialized::extract(header) else {
            return false;
        };
        if !extracted.materialized.should_notify(signal.stage()) {
            return false;
        }
        let signal = signal.wait_command_id(extracted.wait_command_id).build();
        if !extracted.materialized.should_notify_signal(&signal) {
            debug!(
                wait_command_id = %signal.wait_command_id,
                function = %signal.function,
                "Signal irrelevant to awaited function"
            );
            return false;
        }
        self.notifier
            .notify_and_forget(&extracted.endpoint, signal)
            .await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorInfo;
    use crate::identifiers::NamedAggregate;
    use crate::wait::{
        CommandStage, FunctionInfo, StageTarget, WaitStrategy, WaitingForStage,
    };
    use mockall::mock;

    mock! {
        Remote {}

        #[async_trait]
        impl CommandWaitNotifier for Remote {
            async fn notify(&self, endpoint: &str, signal: WaitSignal) -> Result<(), WaitError>;
        }
    }

    impl std::fmt::Debug for MockRemote {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("MockRemote")
        }
    }

    fn builder(stage: CommandStage) -> WaitSignalBuilder {
        WaitSignal::builder(
            "cmd-1",
            NamedAggregate::new("sales", "order").aggregate_id("o-1"),
            stage,
        )
    }

    fn header(target: StageTarget, endpoint: &str) -> Header {
        let mut header = Header::new();
        Materialized::Stage(target).propagate(&mut header, endpoint, "cmd-1");
        header
    }

    #[tokio::test]
    async fn test_emitter_respects_should_notify() {
        let registry = WaitStrategyRegistry::new();
        let waiting = Arc::new(WaitingForStage::processed("cmd-1"));
        registry.register(waiting.clone());
        let emitter = WaitSignalEmitter::new(Arc::new(LocalCommandWaitNotifier::new(registry)));
        let header = header(
            StageTarget::new(CommandStage::Processed, FunctionInfo::any()),
            "local",
        );

        assert!(!emitter.emit(&header, builder(CommandStage::Projected)).await);
        assert!(!emitter.emit(&Header::new(), builder(CommandStage::Processed)).await);
        assert!(emitter.emit(&header, builder(CommandStage::Sent)).await);
        assert!(!waiting.completed());
        assert!(emitter.emit(&header, builder(CommandStage::Processed)).await);
        assert!(waiting.completed());
    }

    #[tokio::test]
    async fn test_emitter_skips_other_functions() {
        let registry = WaitStrategyRegistry::new();
        let emitter = WaitSignalEmitter::new(Arc::new(LocalCommandWaitNotifier::new(registry)));
        let header = header(
            StageTarget::new(CommandStage::EventHandled, FunctionInfo::processor("sales", "Mailer")),
            "local",
        );
        let other = builder(CommandStage::EventHandled)
            .function(FunctionInfo::new("sales", "Audit", "on_created"));
        assert!(!emitter.emit(&header, other).await);
        let failed = builder(CommandStage::Processed).error(&ErrorInfo::of("E", "e"));
        assert!(emitter.emit(&header, failed).await);
    }

    #[tokio::test]
    async fn test_composite_routes_by_endpoint() {
        let mut remote = MockRemote::new();
        remote
            .expect_notify()
            .withf(|endpoint, _| endpoint == "node-b")
            .times(1)
            .returning(|_, _| Ok(()));

        let registry = WaitStrategyRegistry::new();
        let waiting = Arc::new(WaitingForStage::processed("cmd-1"));
        registry.register(waiting.clone());
        let composite = CompositeCommandWaitNotifier::new(
            "node-a",
            LocalCommandWaitNotifier::new(registry),
            Some(Arc::new(remote)),
        );

        composite
            .notify("node-b", builder(CommandStage::Processed).build())
            .await
            .unwrap();
        assert!(!waiting.completed());
        composite
            .notify("node-a", builder(CommandStage::Processed).build())
            .await
            .unwrap();
        assert!(waiting.completed());
    }

    #[tokio::test]
    async fn test_composite_without_remote() {
        let composite = CompositeCommandWaitNotifier::new(
            "node-a",
            LocalCommandWaitNotifier::new(WaitStrategyRegistry::new()),
            None,
        );
        let error = composite
            .notify("node-b", builder(CommandStage::Processed).build())
            .await
            .unwrap_err();
        assert!(matches!(error, WaitError::Transport(_)));
        composite
            .notify_and_forget("node-b", builder(CommandStage::Processed).build())
            .await;
    }
}

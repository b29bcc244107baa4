// Copyright 2025 Cowboy AI, LLC.

//! Tracker waiting for one command to reach one stage

use super::function::FunctionInfo;
use super::propagation::{Materialized, StageTarget};
use super::signal::WaitSignal;
use super::stage::CommandStage;
use super::waiting::{WaitSink, WaitStrategy};

/// Waits until `wait_command_id` reaches a stage, optionally in a given function
///
/// An error signal at an earlier stage fails the wait immediately.
#[derive(Debug)]
pub struct WaitingForStage {
    wait_command_id: String,
    target: StageTarget,
    sink: WaitSink,
}

impl WaitingForStage {
    /// Wait for `stage` in any function matching `function`
    pub fn new(wait_command_id: impl Into<String>, stage: CommandStage, function: FunctionInfo) -> Self {
        Self::from_target(wait_command_id, StageTarget::new(stage, function))
    }

    /// Wait for a materialized target
    pub fn from_target(wait_command_id: impl Into<String>, target: StageTarget) -> Self {
        Self {
            wait_command_id: wait_command_id.into(),
            target,
            sink: WaitSink::new(),
        }
    }

    /// Wait until the command bus accepted the command
    pub fn sent(wait_command_id: impl Into<String>) -> Self {
        Self::new(wait_command_id, CommandStage::Sent, FunctionInfo::any())
    }

    /// Wait until the aggregate processed the command
    pub fn processed(wait_command_id: impl Into<String>) -> Self {
        Self::new(wait_command_id, CommandStage::Processed, FunctionInfo::any())
    }

    /// Wait until the aggregate snapshot is saved
    pub fn snapshot(wait_command_id: impl Into<String>) -> Self {
        Self::new(wait_command_id, CommandStage::Snapshot, FunctionInfo::any())
    }

    /// Wait until the last matching projection ran
    pub fn projected(wait_command_id: impl Into<String>, function: FunctionInfo) -> Self {
        Self::new(wait_command_id, CommandStage::Projected, function)
    }

    /// Wait until a matching event handler ran
    pub fn event_handled(wait_command_id: impl Into<String>, function: FunctionInfo) -> Self {
        Self::new(wait_command_id, CommandStage::EventHandled, function)
    }

    /// Wait until a matching saga ran
    pub fn saga_handled(wait_command_id: impl Into<String>, function: FunctionInfo) -> Self {
        Self::new(wait_command_id, CommandStage::SagaHandled, function)
    }

    /// Awaited target
    pub fn target(&self) -> &StageTarget {
        &self.target
    }
}

impl WaitStrategy for WaitingForStage {
    fn wait_command_id(&self) -> &str {
        &self.wait_command_id
    }

    fn materialized(&self) -> Materialized {
        Materialized::Stage(self.target.clone())
    }

    fn next(&self, signal: WaitSignal) {
        if !self.sink.record(&signal) {
            return;
        }
        if let Some(outcome) = self.target.outcome(&signal) {
            self.sink.complete(outcome);
        }
    }

    fn sink(&self) -> &WaitSink {
        &self.sink
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorInfo;
    use crate::identifiers::NamedAggregate;
    use crate::wait::WaitError;
    use tokio_test::{assert_err, assert_ok};

    fn signal(stage: CommandStage) -> crate::wait::WaitSignalBuilder {
        WaitSignal::builder(
            "cmd-1",
            NamedAggregate::new("sales", "order").aggregate_id("o-1"),
            stage,
        )
    }

    #[tokio::test]
    async fn test_processed_completes_regardless_of_later_signals() {
        let waiting = WaitingForStage::processed("cmd-1");
        waiting.next(signal(CommandStage::SagaHandled).build());
        assert!(!waiting.completed());
        waiting.next(signal(CommandStage::Processed).build());
        assert!(waiting.completed());

        let done = assert_ok!(waiting.wait().await);
        assert_eq!(done.stage, CommandStage::Processed);
    }

    #[tokio::test]
    async fn test_failed_processed_fails_fast() {
        let waiting = WaitingForStage::event_handled("cmd-1", FunctionInfo::any());
        waiting.next(
            signal(CommandStage::Processed)
                .error(&ErrorInfo::of("Rejected", "nope"))
                .build(),
        );
        waiting.next(signal(CommandStage::EventHandled).build());

        let error = assert_err!(waiting.wait().await);
        assert!(matches!(&error, WaitError::Failed(s) if s.stage == CommandStage::Processed));
    }

    #[tokio::test]
    async fn test_sibling_error_does_not_fail() {
        let waiting = WaitingForStage::event_handled("cmd-1", FunctionInfo::any());
        waiting.next(
            signal(CommandStage::Snapshot)
                .error(&ErrorInfo::of("SnapshotFailed", "disk"))
                .build(),
        );
        assert!(!waiting.completed());
        waiting.next(signal(CommandStage::EventHandled).build());
        assert_ok!(waiting.wait().await);
    }

    #[tokio::test]
    async fn test_projected_requires_last_projection() {
        let function = FunctionInfo::processor("sales", "OrderSummary");
        let waiting = WaitingForStage::projected("cmd-1", function.clone());
        let emitted = FunctionInfo::new("sales", "OrderSummary", "on_created");

        waiting.next(signal(CommandStage::Projected).function(emitted.clone()).build());
        assert!(!waiting.completed());
        waiting.next(
            signal(CommandStage::Projected)
                .function(FunctionInfo::new("sales", "Other", "on_created"))
                .is_last_projection(true)
                .build(),
        );
        assert!(!waiting.completed());
        waiting.next(
            signal(CommandStage::Projected)
                .function(emitted)
                .is_last_projection(true)
                .build(),
        );
        assert!(waiting.completed());
    }

    #[tokio::test]
    async fn test_duplicate_terminal_signal_is_no_op() {
        let waiting = WaitingForStage::processed("cmd-1");
        let processed = signal(CommandStage::Processed).build();
        waiting.next(processed.clone());
        waiting.next(processed.clone());
        waiting.next(
            signal(CommandStage::Processed)
                .error(&ErrorInfo::of("Late", "late"))
                .build(),
        );
        assert_eq!(waiting.wait().await.unwrap(), processed);
        assert_eq!(waiting.sink().signals().len(), 1);
    }
}

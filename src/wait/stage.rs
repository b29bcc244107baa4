// Copyright 2025 Cowboy AI, LLC.

//! Checkpoints of the asynchronous command pipeline

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// A named checkpoint reached while a command takes effect
///
/// `SENT` precedes `PROCESSED`, which gates the four post-processing stages.
/// The post-processing stages are siblings: none of them precedes another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandStage {
    /// Accepted by the command bus
    Sent,
    /// Handled by the aggregate and its events appended
    Processed,
    /// Aggregate snapshot saved
    Snapshot,
    /// Events applied by projections
    Projected,
    /// Events handled by event processors
    EventHandled,
    /// Events handled by sagas, possibly spawning downstream commands
    SagaHandled,
}

/// Unknown stage name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command stage: {0}")]
pub struct UnknownStage(pub String);

impl CommandStage {
    /// Every stage in declaration order
    pub const ALL: [CommandStage; 6] = [
        CommandStage::Sent,
        CommandStage::Processed,
        CommandStage::Snapshot,
        CommandStage::Projected,
        CommandStage::EventHandled,
        CommandStage::SagaHandled,
    ];

    /// Stages that must be reached before this one
    pub fn previous(self) -> &'static [CommandStage] {
        match self {
            CommandStage::Sent => &[],
            CommandStage::Processed => &[CommandStage::Sent],
            CommandStage::Snapshot
            | CommandStage::Projected
            | CommandStage::EventHandled
            | CommandStage::SagaHandled => &[CommandStage::Sent, CommandStage::Processed],
        }
    }

    /// Whether `other` strictly precedes this stage
    pub fn is_previous(self, other: CommandStage) -> bool {
        self.previous().contains(&other)
    }

    /// Whether a node processing `processing_stage` must signal a wait targeting this stage
    pub fn should_notify(self, processing_stage: CommandStage) -> bool {
        self == processing_stage || self.is_previous(processing_stage)
    }

    /// Whether waits at this stage name the function they wait for
    pub fn should_wait_function(self) -> bool {
        matches!(
            self,
            CommandStage::Projected | CommandStage::EventHandled | CommandStage::SagaHandled
        )
    }

    /// Wire name of the stage
    pub fn as_str(self) -> &'static str {
        match self {
            CommandStage::Sent => "SENT",
            CommandStage::Processed => "PROCESSED",
            CommandStage::Snapshot => "SNAPSHOT",
            CommandStage::Projected => "PROJECTED",
            CommandStage::EventHandled => "EVENT_HANDLED",
            CommandStage::SagaHandled => "SAGA_HANDLED",
        }
    }
}

impl Display for CommandStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandStage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        CommandStage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == upper)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

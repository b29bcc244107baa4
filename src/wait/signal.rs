// Copyright 2025 Cowboy AI, LLC.

//! Wait signals: notifications that a command reached a pipeline stage

use super::function::FunctionInfo;
use super::stage::CommandStage;
use crate::errors::{codes, ErrorInfo};
use crate::events::now_millis;
use crate::identifiers::{generate_global_id, AggregateId};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Result payload attached to a signal
pub type SignalResult = IndexMap<String, serde_json::Value>;

/// Notification that `command_id` reached `stage`
///
/// Immutable once built. `wait_command_id` names the tracker the signal is
/// routed to; it differs from `command_id` for commands spawned by a saga.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WaitSignal {
    /// Signal id
    pub id: String,
    /// Root command whose tracker receives the signal
    pub wait_command_id: String,
    /// Command that reached the stage
    pub command_id: String,
    /// Aggregate the command targeted
    pub aggregate_id: AggregateId,
    /// Aggregate version after processing, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_version: Option<u32>,
    /// Stage reached
    pub stage: CommandStage,
    /// Function that emitted the signal
    pub function: FunctionInfo,
    /// Downstream command ids spawned at this signal
    #[serde(default)]
    pub commands: Vec<String>,
    /// Stable error code, [`codes::SUCCEEDED`] on success
    pub error_code: String,
    /// Error message, empty on success
    pub error_msg: String,
    /// Whether this is the last projection signal of the stream
    #[serde(default)]
    pub is_last_projection: bool,
    /// Result payload
    #[serde(default)]
    pub result: SignalResult,
    /// Emission time in epoch milliseconds
    pub signal_time: i64,
}

impl WaitSignal {
    /// Start building a signal for `command_id` reaching `stage`
    pub fn builder(
        command_id: impl Into<String>,
        aggregate_id: AggregateId,
        stage: CommandStage,
    ) -> WaitSignalBuilder {
        WaitSignalBuilder::new(command_id.into(), aggregate_id, stage)
    }

    /// Whether the stage was reached without error
    pub fn succeeded(&self) -> bool {
        self.error_code == codes::SUCCEEDED
    }

    /// Error identity of the signal
    pub fn error_info(&self) -> ErrorInfo {
        ErrorInfo::of(self.error_code.clone(), self.error_msg.clone())
    }

    /// Copy of the signal with a replaced result payload
    pub fn with_result(&self, result: SignalResult) -> Self {
        Self {
            result,
            ..self.clone()
        }
    }
}

/// Builder for [`WaitSignal`]
#[derive(Debug, Clone)]
pub struct WaitSignalBuilder {
    signal: WaitSignal,
}

impl WaitSignalBuilder {
    fn new(command_id: String, aggregate_id: AggregateId, stage: CommandStage) -> Self {
        Self {
            signal: WaitSignal {
                id: generate_global_id(),
                wait_command_id: command_id.clone(),
                command_id,
                aggregate_id,
                aggregate_version: None,
                stage,
                function: FunctionInfo::default(),
                commands: Vec::new(),
                error_code: codes::SUCCEEDED.to_string(),
                error_msg: codes::SUCCEEDED_MESSAGE.to_string(),
                is_last_projection: false,
                result: SignalResult::new(),
                signal_time: 0,
            },
        }
    }

    /// Stage of the signal under construction
    pub fn stage(&self) -> CommandStage {
        self.signal.stage
    }

    /// Route the signal to another tracker; defaults to the command id
    pub fn wait_command_id(mut self, wait_command_id: impl Into<String>) -> Self {
        self.signal.wait_command_id = wait_command_id.into();
        self
    }

    /// Emitting function
    pub fn function(mut self, function: FunctionInfo) -> Self {
        self.signal.function = function;
        self
    }

    /// Aggregate version after processing
    pub fn aggregate_version(mut self, version: u32) -> Self {
        self.signal.aggregate_version = Some(version);
        self
    }

    /// Downstream commands spawned at this signal
    pub fn commands(mut self, commands: Vec<String>) -> Self {
        self.signal.commands = commands;
        self
    }

    /// Mark the signal as failed
    pub fn error(mut self, error: &ErrorInfo) -> Self {
        self.signal.error_code = error.error_code.clone();
        self.signal.error_msg = error.error_msg.clone();
        self
    }

    /// Mark the last projection signal
    pub fn is_last_projection(mut self, is_last: bool) -> Self {
        self.signal.is_last_projection = is_last;
        self
    }

    /// Add a result entry
    pub fn result(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.signal.result.insert(key.into(), value);
        self
    }

    /// Override the emission time
    pub fn signal_time(mut self, signal_time: i64) -> Self {
        self.signal.signal_time = signal_time;
        self
    }

    /// Finish the signal, stamping the emission time when unset
    pub fn build(mut self) -> WaitSignal {
        if self.signal.signal_time == 0 {
            self.signal.signal_time = now_millis();
        }
        self.signal
    }
}

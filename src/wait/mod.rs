// Copyright 2025 Cowboy AI, LLC.

//! Command completion tracking
//!
//! Callers register a [`WaitStrategy`] for a command; each pipeline stage
//! emits a [`WaitSignal`] that is routed back, locally or over the endpoint
//! propagated in the command header, until the tracker resolves.

mod function;
mod notifier;
mod propagation;
mod registry;
mod signal;
mod stage;
mod waiting;
mod waiting_for_chain;
mod waiting_for_stage;

pub use function::FunctionInfo;
pub use notifier::{
    CommandWaitNotifier, CompositeCommandWaitNotifier, LocalCommandWaitNotifier,
    WaitSignalEmitter,
};
pub use propagation::{
    ChainTarget, ExtractedWaitStrategy, Materialized, StageTarget, UpstreamKind, SIMPLE_CHAIN,
    WAIT_CHAIN, WAIT_CHAIN_TAIL_CONTEXT, WAIT_CHAIN_TAIL_FUNCTION, WAIT_CHAIN_TAIL_PROCESSOR,
    WAIT_CHAIN_TAIL_STAGE, WAIT_COMMAND_ID, WAIT_ENDPOINT, WAIT_FUNCTION_CONTEXT,
    WAIT_FUNCTION_NAME, WAIT_FUNCTION_PROCESSOR, WAIT_PREFIX, WAIT_STAGE,
};
pub use registry::WaitStrategyRegistry;
pub use signal::{SignalResult, WaitSignal, WaitSignalBuilder};
pub use stage::{CommandStage, UnknownStage};
pub use waiting::{FinallyHook, WaitError, WaitOutcome, WaitSink, WaitStrategy, WaitingStream};
pub use waiting_for_chain::WaitingForChain;
pub use waiting_for_stage::WaitingForStage;

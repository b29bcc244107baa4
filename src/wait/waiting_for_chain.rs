// Copyright 2025 Cowboy AI, LLC.

//! Two-level wait across a command and the commands its sagas spawn
//!
//! The main node waits for the root command at `SAGA_HANDLED`. Every command
//! id listed by the matching main signal gets a tail tracker waiting for the
//! tail target. Signals of downstream commands that arrive before the main
//! signal, failures included, are buffered per command id and replayed once
//! the main signal claims them; signals of commands it does not list are
//! discarded.

use super::function::FunctionInfo;
use super::propagation::{ChainTarget, Materialized, StageTarget};
use super::signal::WaitSignal;
use super::waiting::{WaitOutcome, WaitSink, WaitStrategy};
use super::waiting_for_stage::WaitingForStage;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
struct ChainState {
    main: Option<WaitSignal>,
    tails: HashMap<String, WaitingForStage>,
    pending: HashMap<String, Vec<WaitSignal>>,
}

impl ChainState {
    fn outcome(&self) -> Option<WaitOutcome> {
        let main = self.main.as_ref()?;
        let mut settled = true;
        for tail in self.tails.values() {
            match tail.sink().outcome() {
                Some(Err(error)) => return Some(Err(error)),
                Some(Ok(_)) => {}
                None => settled = false,
            }
        }
        settled.then(|| Ok(main.clone()))
    }
}

/// Waits for a saga-handled root command and every command it spawned
///
/// Only the first `SAGA_HANDLED` signal matching the main function claims
/// downstream commands. Later matching signals, e.g. from a second saga
/// selected by a wildcard function, are recorded but claim nothing; name the
/// saga in the main function when several sagas react to the same command.
#[derive(Debug)]
pub struct WaitingForChain {
    wait_command_id: String,
    target: ChainTarget,
    sink: WaitSink,
    chain: Mutex<ChainState>,
}

impl WaitingForChain {
    /// Wait for `function` at `SAGA_HANDLED`, then for `tail` on each spawned command
    pub fn new(wait_command_id: impl Into<String>, function: FunctionInfo, tail: StageTarget) -> Self {
        Self::from_target(wait_command_id, ChainTarget::new(function, tail))
    }

    /// Wait for a materialized chain target
    pub fn from_target(wait_command_id: impl Into<String>, target: ChainTarget) -> Self {
        Self {
            wait_command_id: wait_command_id.into(),
            target,
            sink: WaitSink::new(),
            chain: Mutex::new(ChainState::default()),
        }
    }

    /// Awaited target
    pub fn target(&self) -> &ChainTarget {
        &self.target
    }

    /// Number of tail trackers created so far
    pub fn tail_count(&self) -> usize {
        self.lock().tails.len()
    }

    fn lock(&self) -> MutexGuard<'_, ChainState> {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn evaluate(&self, signal: WaitSignal) -> Option<WaitOutcome> {
        let mut guard = self.lock();
        let ChainState {
            main,
            tails,
            pending,
        } = &mut *guard;

        if signal.command_id == self.wait_command_id {
            let main_outcome = self.target.main().outcome(&signal);
            match main_outcome {
                Some(Err(error)) => return Some(Err(error)),
                Some(Ok(_)) if main.is_none() => {
                    for command_id in &signal.commands {
                        let tail = tails.entry(command_id.clone()).or_insert_with(|| {
                            WaitingForStage::from_target(command_id.clone(), self.target.tail.clone())
                        });
                        for buffered in pending.remove(command_id).unwrap_or_default() {
                            tail.next(buffered);
                        }
                    }
                    if !pending.is_empty() {
                        debug!(
                            wait_command_id = %self.wait_command_id,
                            unclaimed = pending.len(),
                            "Discarding signals of unclaimed commands"
                        );
                        pending.clear();
                    }
                    *main = Some(signal);
                }
                _ => {}
            }
        } else if main.is_some() {
            match tails.get(&signal.command_id) {
                Some(tail) => tail.next(signal),
                None => debug!(
                    wait_command_id = %self.wait_command_id,
                    command_id = %signal.command_id,
                    "Signal of unclaimed command ignored"
                ),
            }
        } else {
            pending
                .entry(signal.command_id.clone())
                .or_default()
                .push(signal);
        }

        guard.outcome()
    }
}

impl WaitStrategy for WaitingForChain {
    fn wait_command_id(&self) -> &str {
        &self.wait_command_id
    }

    fn materialized(&self) -> Materialized {
        Materialized::Chain(self.target.clone())
    }

    fn next(&self, signal: WaitSignal) {
        if !self.sink.record(&signal) {
            return;
        }
        if let Some(outcome) = self.evaluate(signal) {
            self.sink.complete(outcome);
        }
    }

    fn sink(&self) -> &WaitSink {
        &self.sink
    }
}

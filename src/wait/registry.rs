// Copyright 2025 Cowboy AI, LLC.

//! Process-local registry of active wait strategies

use super::signal::WaitSignal;
use super::waiting::WaitStrategy;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

type Strategies = HashMap<String, Arc<dyn WaitStrategy>>;

/// Active trackers keyed by wait command id
///
/// Constructed once per node and shared by the gateway and the notifiers.
#[derive(Debug, Default, Clone)]
pub struct WaitStrategyRegistry {
    strategies: Arc<RwLock<Strategies>>,
}

impl WaitStrategyRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` unless one is already registered for its command
    ///
    /// Returns the already registered strategy, if any.
    pub fn register(&self, strategy: Arc<dyn WaitStrategy>) -> Option<Arc<dyn WaitStrategy>> {
        let mut strategies = self.strategies.write().unwrap_or_else(PoisonError::into_inner);
        let wait_command_id = strategy.wait_command_id().to_string();
        if let Some(existing) = strategies.get(&wait_command_id) {
            return Some(Arc::clone(existing));
        }
        debug!(wait_command_id = %wait_command_id, "Registered wait strategy");
        strategies.insert(wait_command_id, strategy);
        None
    }

    /// Remove the strategy of `wait_command_id`
    pub fn unregister(&self, wait_command_id: &str) -> Option<Arc<dyn WaitStrategy>> {
        let removed = self
            .strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(wait_command_id);
        if removed.is_some() {
            debug!(wait_command_id, "Unregistered wait strategy");
        }
        removed
    }

    /// The strategy of `wait_command_id`
    pub fn get(&self, wait_command_id: &str) -> Option<Arc<dyn WaitStrategy>> {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(wait_command_id)
            .cloned()
    }

    /// Whether a strategy is registered for `wait_command_id`
    pub fn contains(&self, wait_command_id: &str) -> bool {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(wait_command_id)
    }

    /// Number of registered strategies
    pub fn len(&self) -> usize {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no strategy is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route `signal` to the strategy of its wait command id
    ///
    /// Returns `false` when no strategy is registered, e.g. after a timeout.
    pub fn notify(&self, signal: WaitSignal) -> bool {
        match self.get(&signal.wait_command_id) {
            Some(strategy) => {
                strategy.next(signal);
                true
            }
            None => {
                debug!(
                    wait_command_id = %signal.wait_command_id,
                    stage = %signal.stage,
                    "No wait strategy registered, signal dropped"
                );
                false
            }
        }
    }
}

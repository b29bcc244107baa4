// Copyright 2025 Cowboy AI, LLC.

//! Per-event-type sourcing handlers
//!
//! Handlers are registered once per aggregate type and looked up by event
//! name when a stream is folded onto state.

use super::state::SourcingError;
use crate::events::{DomainEvent, DomainEventBody};
use crate::identifiers::NamedAggregate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

type SourcingFn<S> = Box<dyn Fn(&mut S, &DomainEvent) -> Result<(), SourcingError> + Send + Sync>;

/// Registry mapping an event name to the function folding it onto `S`
pub struct SourcingRegistry<S> {
    handlers: HashMap<&'static str, SourcingFn<S>>,
}

impl<S> Default for SourcingRegistry<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<S> fmt::Debug for SourcingRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort();
        f.debug_struct("SourcingRegistry")
            .field("events", &names)
            .finish()
    }
}

impl<S: 'static> SourcingRegistry<S> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for event body `E`, replacing any previous one
    pub fn on<E, F>(mut self, handler: F) -> Self
    where
        E: DomainEventBody + 'static,
        F: Fn(&mut S, E) + Send + Sync + 'static,
    {
        self.handlers.insert(
            E::NAME,
            Box::new(move |state, event| {
                let body: E = serde_json::from_value(event.body.clone()).map_err(|e| {
                    SourcingError::HandlerFailed {
                        event: event.name.clone(),
                        reason: e.to_string(),
                    }
                })?;
                handler(state, body);
                Ok(())
            }),
        );
        self
    }

    /// Whether a handler exists for `name`
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Fold one event; `Ok(false)` when no handler is registered for it
    pub fn apply(&self, state: &mut S, event: &DomainEvent) -> Result<bool, SourcingError> {
        match self.handlers.get(event.name.as_str()) {
            Some(handler) => handler(state, event).map(|_| true),
            None => Ok(false),
        }
    }
}

/// State type reconstructed from an event stream
pub trait SourcedState: Default + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Aggregate type this state belongs to
    fn named_aggregate() -> NamedAggregate;

    /// Build the sourcing handlers of this state; called once per repository
    fn sourcing_registry() -> SourcingRegistry<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default)]
    struct Counter {
        value: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Added {
        amount: i64,
    }

    impl DomainEventBody for Added {
        const NAME: &'static str = "added";
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Noted {}

    impl DomainEventBody for Noted {
        const NAME: &'static str = "noted";
    }

    #[test]
    fn test_registry_dispatch_by_event_name() {
        let registry = SourcingRegistry::<Counter>::new()
            .on(|state: &mut Counter, event: Added| state.value += event.amount);
        let mut state = Counter::default();

        let applied = registry
            .apply(&mut state, &DomainEvent::of(&Added { amount: 3 }).unwrap())
            .unwrap();
        assert!(applied);
        assert_eq!(state.value, 3);

        let skipped = registry
            .apply(&mut state, &DomainEvent::of(&Noted {}).unwrap())
            .unwrap();
        assert!(!skipped);
        assert_eq!(state.value, 3);
        assert!(registry.contains("added"));
    }

    #[test]
    fn test_registry_rejects_malformed_body() {
        let registry = SourcingRegistry::<Counter>::new()
            .on(|state: &mut Counter, event: Added| state.value += event.amount);
        let mut event = DomainEvent::of(&Added { amount: 1 }).unwrap();
        event.body = serde_json::json!({ "amount": "many" });
        let err = registry.apply(&mut Counter::default(), &event).unwrap_err();
        assert!(matches!(err, SourcingError::HandlerFailed { .. }));
    }
}

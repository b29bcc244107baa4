// Copyright 2025 Cowboy AI, LLC.

//! Domain event bus: fans appended streams out to the event processors

use crate::command::BusError;
use crate::events::DomainEventStream;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::debug;

/// Publishes appended event streams
#[async_trait]
pub trait DomainEventBus: Send + Sync + fmt::Debug {
    /// Publish a stream to every subscriber
    async fn publish(&self, stream: DomainEventStream) -> Result<(), BusError>;
}

/// Receiving end of a bus subscription
pub type DomainEventReceiver = mpsc::UnboundedReceiver<DomainEventStream>;

/// In-process bus delivering every stream to every live subscriber
#[derive(Debug, Clone, Default)]
pub struct InMemoryDomainEventBus {
    subscribers: Arc<Mutex<Vec<mpsc::UnboundedSender<DomainEventStream>>>>,
}

impl InMemoryDomainEventBus {
    /// Create a bus without subscribers
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every stream published from now on
    pub fn subscribe(&self) -> DomainEventReceiver {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sender| !sender.is_closed());
        subscribers.len()
    }
}

#[async_trait]
impl DomainEventBus for InMemoryDomainEventBus {
    async fn publish(&self, stream: DomainEventStream) -> Result<(), BusError> {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sender| sender.send(stream.clone()).is_ok());
        debug!(
            aggregate_id = %stream.aggregate_id,
            version = stream.version,
            subscribers = subscribers.len(),
            "Published event stream"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AggregateDeleted;
    use crate::identifiers::NamedAggregate;

    fn stream() -> DomainEventStream {
        DomainEventStream::builder(NamedAggregate::new("bank", "account").aggregate_id("a-1"), 1)
            .event(&AggregateDeleted {})
            .unwrap()
            .build()
    }

    #[tokio::test]
    async fn test_every_subscriber_receives_the_stream() {
        let bus = InMemoryDomainEventBus::new();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();
        let published = stream();

        bus.publish(published.clone()).await.unwrap();
        assert_eq!(first.recv().await.unwrap(), published);
        assert_eq!(second.recv().await.unwrap(), published);
    }

    #[tokio::test]
    async fn test_dropped_subscribers_are_pruned() {
        let bus = InMemoryDomainEventBus::new();
        let _kept = bus.subscribe();
        drop(bus.subscribe());
        bus.publish(stream()).await.unwrap();
        assert_eq!(bus.subscriber_count(), 1);
    }
}

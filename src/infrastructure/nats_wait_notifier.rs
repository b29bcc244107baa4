// Copyright 2025 Cowboy AI, LLC.

//! Remote wait-signal transport over NATS
//!
//! The endpoint of a wait is a NATS subject. Processing nodes publish JSON
//! encoded signals to it; the tracking node listens on its own endpoint and
//! feeds every received signal into its registry.

use super::nats_client::NatsError;
use crate::wait::{CommandWaitNotifier, WaitError, WaitSignal, WaitStrategyRegistry};
use async_nats::Client;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Publishes wait signals to the endpoint subject
#[derive(Debug, Clone)]
pub struct NatsCommandWaitNotifier {
    client: Client,
}

impl NatsCommandWaitNotifier {
    /// Create a notifier publishing through `client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandWaitNotifier for NatsCommandWaitNotifier {
    async fn notify(&self, endpoint: &str, signal: WaitSignal) -> Result<(), WaitError> {
        let payload =
            serde_json::to_vec(&signal).map_err(|e| WaitError::Transport(e.to_string()))?;
        debug!(
            endpoint,
            wait_command_id = %signal.wait_command_id,
            stage = %signal.stage,
            "Publishing wait signal"
        );
        self.client
            .publish(endpoint.to_string(), Bytes::from(payload))
            .await
            .map_err(|e| WaitError::Transport(e.to_string()))
    }
}

/// Forwards signals published to the local endpoint into the registry
#[derive(Debug)]
pub struct NatsWaitSignalListener {
    endpoint: String,
    task: JoinHandle<()>,
}

impl NatsWaitSignalListener {
    /// Subscribe to `endpoint` and start forwarding
    pub async fn start(
        client: &Client,
        endpoint: impl Into<String>,
        registry: WaitStrategyRegistry,
    ) -> Result<Self, NatsError> {
        let endpoint = endpoint.into();
        let mut subscriber = client
            .subscribe(endpoint.clone())
            .await
            .map_err(|e| NatsError::SubscribeFailed(format!("{endpoint}: {e}")))?;

        let subject = endpoint.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = subscriber.next().await {
                match serde_json::from_slice::<WaitSignal>(&message.payload) {
                    Ok(signal) => {
                        registry.notify(signal);
                    }
                    Err(error) => warn!(
                        endpoint = %subject,
                        error = %error,
                        "Discarding malformed wait signal"
                    ),
                }
            }
            debug!(endpoint = %subject, "Wait signal subscription closed");
        });

        Ok(Self { endpoint, task })
    }

    /// Endpoint this listener serves
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stop forwarding
    pub fn stop(self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifiers::NamedAggregate;
    use crate::infrastructure::nats_client::{connect, NatsConfig};
    use crate::wait::{CommandStage, WaitStrategy, WaitingForStage};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    #[ignore = "requires a NATS server on localhost:4222"]
    async fn test_signal_round_trip_over_nats() {
        let config = NatsConfig::default();
        let client = connect(&config).await.unwrap();
        let endpoint = config.endpoint_subject("test-node");

        let registry = WaitStrategyRegistry::new();
        let waiting = Arc::new(WaitingForStage::processed("cmd-1"));
        registry.register(waiting.clone());
        let listener = NatsWaitSignalListener::start(&client, endpoint.clone(), registry)
            .await
            .unwrap();

        let notifier = NatsCommandWaitNotifier::new(client.clone());
        let signal = WaitSignal::builder(
            "cmd-1",
            NamedAggregate::new("sales", "order").aggregate_id("o-1"),
            CommandStage::Processed,
        )
        .build();
        notifier.notify(&endpoint, signal).await.unwrap();

        let done = tokio::time::timeout(Duration::from_secs(5), waiting.wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.command_id, "cmd-1");
        listener.stop();
    }
}

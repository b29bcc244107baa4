// Copyright 2025 Cowboy AI, LLC.

//! NATS connection used to carry wait signals between nodes

use async_nats::{Client, ConnectOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur when working with NATS
#[derive(Debug, Error)]
pub enum NatsError {
    /// Failed to establish connection to NATS server
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to subscribe to a subject
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),

    /// Invalid configuration provided
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

/// Configuration for NATS client connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL (e.g., "nats://localhost:4222")
    pub url: String,

    /// Optional username for authentication
    pub user: Option<String>,

    /// Optional password for authentication
    pub password: Option<String>,

    /// Whether TLS is required
    pub tls_required: bool,

    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,

    /// Prefix of the wait endpoint subjects of this deployment
    pub subject_prefix: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            user: None,
            password: None,
            tls_required: false,
            connection_timeout_secs: 10,
            subject_prefix: "cim.sourcing.wait".to_string(),
        }
    }
}

impl NatsConfig {
    /// Wait endpoint subject of `node`
    pub fn endpoint_subject(&self, node: &str) -> String {
        format!("{}.{}", self.subject_prefix, node)
    }
}

/// Connect to NATS with the provided configuration
pub async fn connect(config: &NatsConfig) -> Result<Client, NatsError> {
    if config.url.is_empty() {
        return Err(NatsError::ConfigurationError("empty NATS url".to_string()));
    }
    let mut options = ConnectOptions::new()
        .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
        .event_callback(|event| async move {
            match event {
                async_nats::Event::Disconnected => warn!("NATS disconnected"),
                async_nats::Event::Connected => info!("NATS connected"),
                async_nats::Event::ClientError(err) => warn!(error = %err, "NATS client error"),
                _ => {}
            }
        });

    if let (Some(user), Some(password)) = (&config.user, &config.password) {
        options = options.user_and_password(user.clone(), password.clone());
    }
    if config.tls_required {
        options = options.require_tls(true);
    }

    options
        .connect(&config.url)
        .await
        .map_err(|e| NatsError::ConnectionFailed(format!("Failed to connect to {}: {}", config.url, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NatsConfig::default();
        assert_eq!(config.url, "nats://localhost:4222");
        assert_eq!(config.connection_timeout_secs, 10);
        assert_eq!(config.endpoint_subject("node-a"), "cim.sourcing.wait.node-a");
    }

    #[tokio::test]
    async fn test_empty_url_rejected() {
        let config = NatsConfig {
            url: String::new(),
            ..Default::default()
        };
        assert!(matches!(
            connect(&config).await,
            Err(NatsError::ConfigurationError(_))
        ));
    }
}

//! NATS connection management
//!
//! Named connections with keep-alive and optional credentials. JetStream
//! contexts are derived from the shared client.

use async_nats::{connection::State, jetstream, Client, ConnectOptions};
use std::time::Duration;
use tracing::info;

use crate::config::NatsArgs;
use crate::types::WeirError;

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// NATS client wrapper with JetStream support
#[derive(Clone)]
pub struct NatsClient {
    /// Underlying NATS client
    client: Client,
}

impl NatsClient {
    /// Create a new NATS client
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self, WeirError> {
        info!("Connecting to NATS at {}", args.nats_url);

        // Fail fast if NATS is unavailable; reconnection still works after
        // the initial successful connection.
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| WeirError::Queue(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);

        Ok(Self { client })
    }

    /// Derive a JetStream context from this connection
    pub fn jetstream(&self) -> jetstream::Context {
        jetstream::new(self.client.clone())
    }

    /// Whether the connection is currently established
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == State::Connected
    }

    /// Flush pending messages
    pub async fn flush(&self) -> Result<(), WeirError> {
        self.client
            .flush()
            .await
            .map_err(|e| WeirError::Queue(format!("Flush failed: {}", e)))
    }
}

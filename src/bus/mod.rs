//! Broker adapters for commands in and events out.
//!
//! This module contains:
//! - `CommandSource` trait: pulls inbound command deliveries
//! - `Acknowledge` trait: the per-delivery acknowledgment handle
//! - `EventSink` trait: accepts outbound event records
//! - Messaging configuration types
//! - Implementations: Kafka, stdio lines, in-memory channel, mock sink

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

// Implementation modules
pub mod channel;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod mock;
pub mod stdio;

// Re-exports
pub use channel::{AckLog, ChannelCommandSource, CommandSender};
#[cfg(feature = "kafka")]
pub use kafka::{KafkaCommandSource, KafkaEventSink};
pub use mock::MockEventSink;
pub use stdio::{LineCommandSource, LineEventSink};

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Acknowledge failed: {0}")]
    Ack(String),
}

/// Acknowledgment handle for one delivery.
///
/// Consumed by value, so a delivery can be acknowledged at most once.
pub trait Acknowledge: Send {
    /// Tell the broker the delivery was accepted for processing.
    fn ack(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}

/// One inbound message together with its acknowledgment handle.
pub struct InboundDelivery {
    payload: Vec<u8>,
    key: Option<String>,
    ack: Box<dyn Acknowledge>,
}

impl InboundDelivery {
    pub fn new(payload: Vec<u8>, key: Option<String>, ack: Box<dyn Acknowledge>) -> Self {
        Self { payload, key, ack }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Split into payload, key and acknowledgment handle.
    pub fn into_parts(self) -> (Vec<u8>, Option<String>, Box<dyn Acknowledge>) {
        (self.payload, self.key, self.ack)
    }
}

impl std::fmt::Debug for InboundDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundDelivery")
            .field("payload_len", &self.payload.len())
            .field("key", &self.key)
            .finish()
    }
}

/// Source of inbound command deliveries.
#[async_trait]
pub trait CommandSource: Send + Sync {
    /// Wait for the next delivery.
    ///
    /// `Ok(None)` means the source is exhausted and will never yield again.
    async fn recv(&self) -> Result<Option<InboundDelivery>>;
}

/// Outbound event record: routing key plus serialized payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    pub key: String,
    pub payload: Vec<u8>,
}

impl OutboundRecord {
    pub fn new(key: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }
}

/// Destination for outbound event records.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Hand a record over for delivery.
    ///
    /// Returns once the record is accepted; delivery confirmation, if the
    /// transport has one, is not awaited.
    async fn publish(&self, record: OutboundRecord) -> Result<()>;

    /// Wait for records handed over so far to leave the process.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// Kafka messaging.
    #[default]
    Kafka,
    /// Commands as JSON lines on stdin, events as lines on stdout.
    Stdio,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// Kafka-specific configuration.
    pub kafka: KafkaConfig,
}

/// Kafka-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    /// Kafka bootstrap servers (comma-separated).
    pub bootstrap_servers: String,
    /// Consumer group ID for the command topic.
    pub group_id: String,
    /// Topic carrying inbound commands.
    pub command_topic: String,
    /// Topic receiving outbound events.
    pub event_topic: String,
    /// Topic receiving dead letters (failed updates). Unset disables the
    /// Kafka dead-letter publisher.
    pub dead_letter_topic: Option<String>,
    /// SASL username (optional, for authenticated clusters).
    pub sasl_username: Option<String>,
    /// SASL password (optional, for authenticated clusters).
    pub sasl_password: Option<String>,
    /// SASL mechanism (PLAIN, SCRAM-SHA-256, SCRAM-SHA-512).
    pub sasl_mechanism: Option<String>,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
    /// SSL CA certificate path (for SSL connections).
    pub ssl_ca_location: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            bootstrap_servers: "localhost:9092".to_string(),
            group_id: "incident-bridge".to_string(),
            command_topic: "incident-command".to_string(),
            event_topic: "incident-event".to_string(),
            dead_letter_topic: None,
            sasl_username: None,
            sasl_password: None,
            sasl_mechanism: None,
            security_protocol: None,
            ssl_ca_location: None,
        }
    }
}

// ============================================================================
// Factory
// ============================================================================

/// Command source and event sink pair for one messaging backend.
pub struct Transport {
    pub source: Box<dyn CommandSource>,
    pub sink: Arc<dyn EventSink>,
}

/// Initialize the transport based on configuration.
///
/// Kafka requires the `kafka` feature.
pub async fn init_transport(
    config: &MessagingConfig,
) -> std::result::Result<Transport, Box<dyn std::error::Error + Send + Sync>> {
    match config.messaging_type {
        MessagingType::Kafka => {
            #[cfg(feature = "kafka")]
            {
                let source = KafkaCommandSource::new(&config.kafka)?;
                let sink = KafkaEventSink::new(&config.kafka)?;
                info!(
                    messaging_type = "kafka",
                    command_topic = %config.kafka.command_topic,
                    event_topic = %config.kafka.event_topic,
                    "Transport initialized"
                );
                Ok(Transport {
                    source: Box::new(source),
                    sink: Arc::new(sink),
                })
            }

            #[cfg(not(feature = "kafka"))]
            {
                Err("Kafka support requires the 'kafka' feature. Rebuild with --features kafka".into())
            }
        }
        MessagingType::Stdio => {
            info!(messaging_type = "stdio", "Transport initialized");
            Ok(Transport {
                source: Box::new(LineCommandSource::stdin()),
                sink: Arc::new(LineEventSink::stdout()),
            })
        }
    }
}

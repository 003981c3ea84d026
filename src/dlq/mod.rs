//! Dead Letter Queue (DLQ) infrastructure.
//!
//! Incident updates that were accepted but never turned into an event (the
//! service failed, timed out or panicked, or the event could not be
//! published) are handed to a [`DeadLetterPublisher`] for review and replay.
//!
//! ## Message Format
//!
//! Dead letters are JSON documents:
//! - `id`: unique id of the dead letter
//! - `incidentId`, `messageType`: routing info
//! - `payload`: the incident as it was when the failure happened
//! - `reason` / `kind`: human-readable and structured failure cause
//! - `occurredAt`, `sourceComponent`, `metadata`

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bus::{MessagingConfig, MessagingType};
use crate::message::Incident;

#[cfg(feature = "kafka")]
mod kafka;
#[cfg(feature = "kafka")]
pub use kafka::KafkaDeadLetterPublisher;

/// Errors that can occur during DLQ operations.
#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("Failed to serialize message: {0}")]
    Serialization(String),

    #[error("Failed to publish to DLQ: {0}")]
    PublishFailed(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Structured cause of a dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The domain service returned an error.
    ServiceError,
    /// The domain service did not answer within the update timeout.
    TimedOut,
    /// The blocking update task panicked or was cancelled.
    Aborted,
    /// The outbound channel was closed before the update could be queued.
    ChannelClosed,
    /// The outgoing event could not be serialized.
    Serialization,
    /// The event sink refused the outgoing event.
    PublishFailed,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ServiceError => "service_error",
            FailureKind::TimedOut => "timed_out",
            FailureKind::Aborted => "aborted",
            FailureKind::ChannelClosed => "channel_closed",
            FailureKind::Serialization => "serialization",
            FailureKind::PublishFailed => "publish_failed",
        }
    }
}

/// Dead letter queue entry for a failed incident update.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub id: Uuid,
    /// Incident the failed update was for.
    pub incident_id: String,
    /// Message type of the command that triggered the update.
    pub message_type: String,
    /// The incident as known at the time of failure.
    pub payload: serde_json::Value,
    /// Human-readable reason for rejection.
    pub reason: String,
    pub kind: FailureKind,
    pub occurred_at: DateTime<Utc>,
    /// Which pipeline stage sent to DLQ.
    pub source_component: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl DeadLetter {
    /// Create a dead letter for an incident update that failed.
    pub fn for_incident(
        incident: &Incident,
        message_type: impl Into<String>,
        kind: FailureKind,
        reason: impl Into<String>,
        source_component: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            incident_id: incident.id.clone(),
            message_type: message_type.into(),
            payload: serde_json::to_value(incident).unwrap_or_default(),
            reason: reason.into(),
            kind,
            occurred_at: Utc::now(),
            source_component: source_component.into(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the dead letter.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Serialize to the JSON wire form.
    pub fn to_json(&self) -> Result<Vec<u8>, DlqError> {
        serde_json::to_vec(self).map_err(|e| DlqError::Serialization(e.to_string()))
    }
}

/// Trait for publishing messages to a dead letter queue.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    /// Publish a dead letter to the queue.
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError>;

    /// Wait for dead letters published so far to leave the process.
    async fn flush(&self) -> Result<(), DlqError> {
        Ok(())
    }

    /// Check if the publisher is configured and ready.
    fn is_configured(&self) -> bool {
        true
    }
}

/// No-op DLQ publisher that logs but doesn't actually send anywhere.
///
/// Used when no dead-letter topic is configured.
pub struct NoopDeadLetterPublisher;

#[async_trait]
impl DeadLetterPublisher for NoopDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        warn!(
            incident_id = %dead_letter.incident_id,
            kind = dead_letter.kind.as_str(),
            reason = %dead_letter.reason,
            source = %dead_letter.source_component,
            "DLQ not configured, logging dead letter"
        );
        Ok(())
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// In-memory DLQ publisher using a channel.
///
/// Used for local runs and testing.
pub struct ChannelDeadLetterPublisher {
    sender: mpsc::UnboundedSender<DeadLetter>,
}

impl ChannelDeadLetterPublisher {
    /// Create a new channel-based DLQ publisher.
    ///
    /// Returns the publisher and a receiver for consuming dead letters.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DeadLetterPublisher for ChannelDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        info!(
            incident_id = %dead_letter.incident_id,
            reason = %dead_letter.reason,
            "Publishing to channel DLQ"
        );
        self.sender
            .send(dead_letter)
            .map_err(|e| DlqError::PublishFailed(e.to_string()))
    }
}

/// Create a DLQ publisher based on messaging configuration.
///
/// Kafka messaging with a `dead_letter_topic` yields a Kafka publisher;
/// anything else falls back to the noop publisher.
pub fn create_publisher(
    config: &MessagingConfig,
) -> Result<Arc<dyn DeadLetterPublisher>, DlqError> {
    match (&config.messaging_type, &config.kafka.dead_letter_topic) {
        (MessagingType::Kafka, Some(topic)) => {
            #[cfg(feature = "kafka")]
            {
                let publisher = KafkaDeadLetterPublisher::new(&config.kafka, topic)?;
                Ok(Arc::new(publisher))
            }

            #[cfg(not(feature = "kafka"))]
            {
                warn!(%topic, "Kafka DLQ configured without the 'kafka' feature, using noop");
                Ok(Arc::new(NoopDeadLetterPublisher))
            }
        }
        _ => {
            debug!("No DLQ configured, using noop publisher");
            Ok(Arc::new(NoopDeadLetterPublisher))
        }
    }
}

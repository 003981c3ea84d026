//! Kafka dead-letter publisher.

use async_trait::async_trait;
use tracing::info;

use super::{DeadLetter, DeadLetterPublisher, DlqError};
use crate::bus::{EventSink, KafkaConfig, KafkaEventSink, OutboundRecord};

/// Publishes JSON dead letters to a Kafka topic, keyed by incident id.
pub struct KafkaDeadLetterPublisher {
    sink: KafkaEventSink,
}

impl KafkaDeadLetterPublisher {
    pub fn new(config: &KafkaConfig, topic: &str) -> Result<Self, DlqError> {
        let sink = KafkaEventSink::for_topic(config, topic)
            .map_err(|e| DlqError::Connection(e.to_string()))?;
        Ok(Self { sink })
    }
}

#[async_trait]
impl DeadLetterPublisher for KafkaDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        let payload = dead_letter.to_json()?;
        self.sink
            .publish(OutboundRecord::new(dead_letter.incident_id.clone(), payload))
            .await
            .map_err(|e| DlqError::PublishFailed(e.to_string()))?;

        info!(
            topic = %self.sink.topic(),
            incident_id = %dead_letter.incident_id,
            kind = dead_letter.kind.as_str(),
            "Published dead letter"
        );
        Ok(())
    }

    async fn flush(&self) -> Result<(), DlqError> {
        self.sink
            .flush()
            .await
            .map_err(|e| DlqError::PublishFailed(format!("Failed to flush DLQ producer: {}", e)))
    }
}

//! Event publisher: turns updated incidents into `IncidentUpdatedEvent`
//! records and hands them to the event sink.

use std::sync::Arc;

use tracing::{debug, error, info};

use super::channel::OutboundReceiver;
use super::send_dead_letter;
use crate::bus::{BusError, EventSink, OutboundRecord};
use crate::dlq::{DeadLetter, DeadLetterPublisher, FailureKind};
use crate::message::{Incident, OutgoingEnvelope, INCIDENT_UPDATED_EVENT};

/// Component name stamped on dead letters raised here.
const COMPONENT: &str = "publisher";

/// Failure to publish one event.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Event sink rejected record: {0}")]
    Sink(#[from] BusError),
}

impl PublishError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PublishError::Serialization(_) => FailureKind::Serialization,
            PublishError::Sink(_) => FailureKind::PublishFailed,
        }
    }
}

/// Build the outbound record for an updated incident: keyed by incident id,
/// payload is the JSON `IncidentUpdatedEvent` envelope.
pub fn to_record(incident: Incident) -> Result<OutboundRecord, PublishError> {
    let key = incident.id.clone();
    let payload = serde_json::to_vec(&OutgoingEnvelope::incident_updated(incident))?;
    Ok(OutboundRecord::new(key, payload))
}

/// Drains the outbound channel into the event sink.
pub struct EventPublisher {
    sink: Arc<dyn EventSink>,
    dead_letters: Arc<dyn DeadLetterPublisher>,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn EventSink>, dead_letters: Arc<dyn DeadLetterPublisher>) -> Self {
        Self { sink, dead_letters }
    }

    /// Publish one updated incident.
    #[tracing::instrument(name = "pipeline.publish", skip_all, fields(incident_id = %incident.id))]
    pub async fn publish(&self, incident: Incident) -> Result<(), PublishError> {
        let record = to_record(incident)?;
        self.sink.publish(record).await?;
        Ok(())
    }

    /// Publish every incident until the channel closes and is drained, then
    /// flush the sink. Returns the number of events handed to the sink.
    pub async fn run(self, mut receiver: OutboundReceiver) -> u64 {
        let mut published = 0u64;

        while let Some(incident) = receiver.recv().await {
            let incident_id = incident.id.clone();
            let result = self.publish(incident.clone()).await;

            #[cfg(feature = "otel")]
            {
                use crate::utils::metrics::{self, EVENT_PUBLISH_TOTAL};
                let outcome = match &result {
                    Ok(()) => "success",
                    Err(e) => e.kind().as_str(),
                };
                EVENT_PUBLISH_TOTAL.add(1, &[metrics::outcome_attr(outcome)]);
            }

            match result {
                Ok(()) => {
                    published += 1;
                    debug!(%incident_id, "Published incident updated event");
                }
                Err(e) => {
                    error!(%incident_id, error = %e, "Failed to publish incident updated event");
                    let dead_letter = DeadLetter::for_incident(
                        &incident,
                        INCIDENT_UPDATED_EVENT,
                        e.kind(),
                        e.to_string(),
                        COMPONENT,
                    );
                    send_dead_letter(self.dead_letters.as_ref(), dead_letter).await;
                }
            }
        }

        if let Err(e) = self.sink.flush().await {
            error!(error = %e, "Failed to flush event sink");
        }
        info!(published, "Event publisher stopped");
        published
    }
}

//! Update dispatcher: owns the boundary between the async consumption path
//! and the blocking incident service.
//!
//! Each accepted command becomes one tokio task. The task waits for a slot in
//! the update pool and runs the service call on the blocking pool, both within
//! one timeout, then queues the updated incident on the outbound channel. Failures
//! are logged, counted and dead-lettered; they never reach the caller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, warn, Instrument};

use super::channel::OutboundSender;
use super::send_dead_letter;
use crate::dlq::{DeadLetter, DeadLetterPublisher, FailureKind};
use crate::message::{DecodeError, Envelope, Incident};
use crate::service::{IncidentService, ServiceError};

/// Component name stamped on dead letters raised here.
const COMPONENT: &str = "dispatcher";

/// Rejection before anything was submitted.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to decode incident: {0}")]
    Decode(#[from] DecodeError),
}

/// Why an accepted update produced no event.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchFailure {
    #[error("Incident service failed: {0}")]
    Service(#[from] ServiceError),

    #[error("Incident service timed out after {0:?}")]
    TimedOut(Duration),

    #[error("Update task aborted: {0}")]
    Aborted(String),

    #[error("Outbound channel closed")]
    ChannelClosed,
}

impl DispatchFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            DispatchFailure::Service(_) => FailureKind::ServiceError,
            DispatchFailure::TimedOut(_) => FailureKind::TimedOut,
            DispatchFailure::Aborted(_) => FailureKind::Aborted,
            DispatchFailure::ChannelClosed => FailureKind::ChannelClosed,
        }
    }
}

/// Final state of one dispatched update.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    /// The service returned this incident and it was queued for publishing.
    Updated(Incident),
    /// No event will be published for this incident.
    Failed {
        incident: Incident,
        failure: DispatchFailure,
    },
}

impl DispatchOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, DispatchOutcome::Updated(_))
    }

    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Updated(_) => "success",
            DispatchOutcome::Failed { failure, .. } => failure.kind().as_str(),
        }
    }
}

/// Handle to a submitted update. Dropping it detaches the update.
#[derive(Debug)]
pub struct DispatchHandle {
    task: JoinHandle<DispatchOutcome>,
}

impl DispatchHandle {
    /// Wait for the update to settle.
    pub async fn outcome(self) -> Result<DispatchOutcome, JoinError> {
        self.task.await
    }
}

/// Submits incident updates to the incident service.
#[derive(Clone)]
pub struct UpdateDispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    service: Arc<dyn IncidentService>,
    outbound: OutboundSender,
    permits: Arc<Semaphore>,
    timeout: Duration,
    dead_letters: Arc<dyn DeadLetterPublisher>,
}

impl UpdateDispatcher {
    pub fn new(
        service: Arc<dyn IncidentService>,
        outbound: OutboundSender,
        max_concurrent_updates: usize,
        timeout: Duration,
        dead_letters: Arc<dyn DeadLetterPublisher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service,
                outbound,
                permits: Arc::new(Semaphore::new(max_concurrent_updates.max(1))),
                timeout,
                dead_letters,
            }),
        }
    }

    /// Decode the envelope's incident and submit its update.
    ///
    /// Returns as soon as the update task is spawned. Must be called within
    /// a tokio runtime.
    pub fn dispatch(&self, envelope: &Envelope) -> Result<DispatchHandle, DispatchError> {
        let incident = Incident::from_document(envelope.entity())?;
        let message_type = envelope.message_type().to_string();
        debug!(incident_id = %incident.id, %message_type, "Dispatching incident update");

        let inner = Arc::clone(&self.inner);
        let span = tracing::info_span!("pipeline.dispatch", incident_id = %incident.id);
        let task = tokio::spawn(inner.update(incident, message_type).instrument(span));

        Ok(DispatchHandle { task })
    }
}

impl Inner {
    async fn update(self: Arc<Self>, incident: Incident, message_type: String) -> DispatchOutcome {
        #[cfg(feature = "otel")]
        let start = std::time::Instant::now();

        let outcome = match self.call_service(incident.clone()).await {
            Ok(updated) => match self.outbound.send(updated.clone()).await {
                Ok(()) => DispatchOutcome::Updated(updated),
                Err(returned) => DispatchOutcome::Failed {
                    incident: returned,
                    failure: DispatchFailure::ChannelClosed,
                },
            },
            Err(failure) => DispatchOutcome::Failed { incident, failure },
        };

        #[cfg(feature = "otel")]
        {
            use crate::utils::metrics::{self, DISPATCH_DURATION, DISPATCH_TOTAL};
            let attrs = [
                metrics::outcome_attr(outcome.label()),
                metrics::message_type_attr(&message_type),
            ];
            DISPATCH_DURATION.record(start.elapsed().as_secs_f64(), &attrs);
            DISPATCH_TOTAL.add(1, &attrs);
        }

        if let DispatchOutcome::Failed { incident, failure } = &outcome {
            error!(
                incident_id = %incident.id,
                %message_type,
                outcome = outcome.label(),
                error = %failure,
                "Incident update failed"
            );

            let mut dead_letter = DeadLetter::for_incident(
                incident,
                message_type.as_str(),
                failure.kind(),
                failure.to_string(),
                COMPONENT,
            );
            if let DispatchFailure::TimedOut(timeout) = failure {
                dead_letter =
                    dead_letter.with_metadata("timeout_ms", &timeout.as_millis().to_string());
            }
            send_dead_letter(self.dead_letters.as_ref(), dead_letter).await;
        }

        outcome
    }

    /// Run the service call on the blocking pool.
    ///
    /// One deadline covers both the wait for a pool slot and the call. The
    /// slot is held by the blocking closure, so a call that outlives its
    /// deadline still occupies the slot until the thread returns.
    async fn call_service(&self, incident: Incident) -> Result<Incident, DispatchFailure> {
        let deadline = Instant::now() + self.timeout;

        let permit = match timeout_at(deadline, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DispatchFailure::Aborted("update pool closed".to_string())),
            Err(_) => return Err(self.timed_out("waiting for a pool slot")),
        };

        let service = Arc::clone(&self.service);
        let call = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            service.update_incident(incident)
        });

        match timeout_at(deadline, call).await {
            Ok(Ok(result)) => result.map_err(DispatchFailure::Service),
            Ok(Err(join_error)) => Err(DispatchFailure::Aborted(join_error.to_string())),
            Err(_) => Err(self.timed_out("calling the incident service")),
        }
    }

    fn timed_out(&self, stage: &str) -> DispatchFailure {
        warn!(
            timeout_ms = self.timeout.as_millis() as u64,
            stage,
            "Incident service call timed out"
        );
        DispatchFailure::TimedOut(self.timeout)
    }
}

//! Command-to-event pipeline.
//!
//! ```text
//! CommandSource -> AckController -> EnvelopeFilter -> UpdateDispatcher
//!                        |                                  |
//!                       ack                          outbound channel
//!                                                           |
//!                                        EventPublisher -> EventSink
//! ```
//!
//! Consumption and publication are decoupled by the outbound channel: a
//! delivery is acknowledged as soon as its update is submitted, and the
//! resulting event is published whenever the update settles.

pub mod ack;
pub mod channel;
pub mod dispatcher;
pub mod filter;
pub mod publisher;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::bus::{CommandSource, EventSink};
use crate::config::PipelineConfig;
use crate::dlq::{DeadLetter, DeadLetterPublisher};
use crate::service::IncidentService;

pub use ack::{AckController, Disposition};
pub use channel::{OutboundReceiver, OutboundSender};
pub use dispatcher::{
    DispatchError, DispatchFailure, DispatchHandle, DispatchOutcome, UpdateDispatcher,
};
pub use filter::{EnvelopeFilter, Verdict};
pub use publisher::{EventPublisher, PublishError};

/// Pause after a failed receive before polling the source again.
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Hand a dead letter to the publisher, logging (never propagating) failures.
pub(crate) async fn send_dead_letter(
    publisher: &dyn DeadLetterPublisher,
    dead_letter: DeadLetter,
) {
    #[cfg(feature = "otel")]
    let kind = dead_letter.kind;
    let incident_id = dead_letter.incident_id.clone();

    let result = publisher.publish(dead_letter).await;

    #[cfg(feature = "otel")]
    {
        use crate::utils::metrics::{self, DLQ_PUBLISH_TOTAL};
        let outcome = if result.is_ok() { "success" } else { "error" };
        DLQ_PUBLISH_TOTAL.add(
            1,
            &[
                metrics::outcome_attr(outcome),
                metrics::reason_type_attr(kind.as_str()),
            ],
        );
    }

    if let Err(e) = result {
        error!(%incident_id, error = %e, "Failed to publish dead letter");
    }
}

/// Counters reported when a pipeline run ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Deliveries pulled from the source by `run` (each acknowledged once).
    pub deliveries: u64,
    /// Events handed to the sink.
    pub published: u64,
}

/// Wired pipeline: controller in front, publisher task behind.
pub struct Pipeline {
    controller: AckController,
    publisher: JoinHandle<u64>,
    dead_letters: Arc<dyn DeadLetterPublisher>,
}

impl Pipeline {
    /// Build the pipeline and start its publisher task.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        config: &PipelineConfig,
        service: Arc<dyn IncidentService>,
        sink: Arc<dyn EventSink>,
        dead_letters: Arc<dyn DeadLetterPublisher>,
    ) -> Self {
        let (sender, receiver) = channel::outbound(config.channel_capacity);
        let dispatcher = UpdateDispatcher::new(
            service,
            sender,
            config.max_concurrent_updates,
            config.update_timeout(),
            Arc::clone(&dead_letters),
        );
        let controller = AckController::new(EnvelopeFilter::from_config(config), dispatcher);
        let publisher = tokio::spawn(
            EventPublisher::new(sink, Arc::clone(&dead_letters)).run(receiver),
        );

        info!(
            accepted_message_types = ?config.accepted_message_types,
            channel_capacity = config.channel_capacity,
            max_concurrent_updates = config.max_concurrent_updates,
            update_timeout_ms = config.update_timeout_ms,
            "Pipeline started"
        );

        Self {
            controller,
            publisher,
            dead_letters,
        }
    }

    /// The controller, for driving single deliveries by hand.
    pub fn controller(&self) -> &AckController {
        &self.controller
    }

    /// Consume `source` until `shutdown` resolves or the source is exhausted.
    ///
    /// On the way out, waits for in-flight updates to settle and for the
    /// publisher to drain the outbound channel.
    pub async fn run<F>(self, source: &dyn CommandSource, shutdown: F) -> RunSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut deliveries = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping consumption");
                    break;
                }
                next = source.recv() => match next {
                    Ok(Some(delivery)) => {
                        deliveries += 1;
                        self.controller.process(delivery).await;
                    }
                    Ok(None) => {
                        info!("Command source exhausted");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to receive command");
                        tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        self.finish(deliveries).await
    }

    /// Drop the controller (and with it the last dispatcher-owned sender),
    /// wait for the publisher to drain, then flush the dead-letter publisher.
    async fn finish(self, deliveries: u64) -> RunSummary {
        let Pipeline {
            controller,
            publisher,
            dead_letters,
        } = self;
        drop(controller);

        let published = match publisher.await {
            Ok(published) => published,
            Err(e) => {
                error!(error = %e, "Event publisher task failed");
                0
            }
        };

        // Every dispatch and publish task has finished, so no dead letter
        // can be raised after this point.
        if let Err(e) = dead_letters.flush().await {
            error!(error = %e, "Failed to flush dead-letter publisher");
        }

        info!(deliveries, published, "Pipeline stopped");
        RunSummary {
            deliveries,
            published,
        }
    }

    /// Stop without consuming anything further.
    pub async fn shutdown(self) -> RunSummary {
        self.finish(0).await
    }
}

#[cfg(test)]
mod tests;

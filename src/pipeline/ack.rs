//! Acknowledgment controller: runs one delivery through filter and
//! dispatch submission, then acknowledges it.

use tracing::{error, warn};

use super::dispatcher::{DispatchError, DispatchHandle, UpdateDispatcher};
use super::filter::{EnvelopeFilter, Verdict};
use crate::bus::InboundDelivery;

/// What happened to one delivery before it was acknowledged.
#[derive(Debug)]
pub enum Disposition {
    /// Filtered out (wrong type, wrong shape or not JSON).
    Ignored,
    /// Accepted by the filter but its incident could not be decoded.
    Rejected(DispatchError),
    /// Update submitted; the handle resolves once it settles.
    Dispatched(DispatchHandle),
}

pub struct AckController {
    filter: EnvelopeFilter,
    dispatcher: UpdateDispatcher,
}

impl AckController {
    pub fn new(filter: EnvelopeFilter, dispatcher: UpdateDispatcher) -> Self {
        Self { filter, dispatcher }
    }

    /// Filter, submit and acknowledge one delivery.
    ///
    /// The delivery is acknowledged exactly once whatever the disposition;
    /// the update itself may still be running when this returns.
    pub async fn process(&self, delivery: InboundDelivery) -> Disposition {
        let (payload, key, ack) = delivery.into_parts();

        let (outcome, disposition) = match self.filter.inspect(&payload) {
            Verdict::Accepted(envelope) => match self.dispatcher.dispatch(&envelope) {
                Ok(handle) => ("accepted", Disposition::Dispatched(handle)),
                Err(e) => {
                    warn!(
                        key = ?key,
                        error = %e,
                        payload = %String::from_utf8_lossy(&payload),
                        "Unexpected message format"
                    );
                    ("malformed", Disposition::Rejected(e))
                }
            },
            verdict => (verdict.outcome(), Disposition::Ignored),
        };

        #[cfg(feature = "otel")]
        {
            use crate::utils::metrics::{self, COMMAND_TOTAL};
            COMMAND_TOTAL.add(1, &[metrics::outcome_attr(outcome)]);
        }
        #[cfg(not(feature = "otel"))]
        let _ = outcome;

        if let Err(e) = ack.ack().await {
            error!(key = ?key, error = %e, "Failed to acknowledge command");
        }

        disposition
    }
}

//! Pipeline tuning: which commands are accepted and how updates are bounded.

use std::collections::HashSet;
use std::time::Duration;

use serde::Deserialize;

use crate::message::{INCIDENT_FIELD, UPDATE_INCIDENT_COMMAND};

/// Default outbound channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default number of domain-service calls allowed in flight.
pub const DEFAULT_MAX_CONCURRENT_UPDATES: usize = 16;

/// Default bound on a single domain-service call.
pub const DEFAULT_UPDATE_TIMEOUT_MS: u64 = 10_000;

/// Pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Command types that are dispatched; everything else is ignored.
    pub accepted_message_types: Vec<String>,

    /// Field of `body` that must hold the incident document.
    pub required_body_field: String,

    /// Outbound channel capacity.
    ///
    /// Default: 1,024. Dispatch tasks wait for space when it is full.
    pub channel_capacity: usize,

    /// Maximum domain-service calls in flight.
    pub max_concurrent_updates: usize,

    /// Per-update timeout in milliseconds. Covers the wait for a free slot
    /// as well as the domain-service call itself.
    pub update_timeout_ms: u64,
}

impl PipelineConfig {
    pub fn accepted_set(&self) -> HashSet<String> {
        self.accepted_message_types.iter().cloned().collect()
    }

    pub fn update_timeout(&self) -> Duration {
        Duration::from_millis(self.update_timeout_ms)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            accepted_message_types: vec![UPDATE_INCIDENT_COMMAND.to_string()],
            required_body_field: INCIDENT_FIELD.to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_concurrent_updates: DEFAULT_MAX_CONCURRENT_UPDATES,
            update_timeout_ms: DEFAULT_UPDATE_TIMEOUT_MS,
        }
    }
}

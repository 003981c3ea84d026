//! OTel-native metrics instruments.
//!
//! Centralized metric definitions using OpenTelemetry meters.
//! All instruments are lazily initialized and feature-gated behind `otel`.
//!
//! Naming follows OTel semantic conventions (dot-separated).
//! The OTel Collector / Prometheus exporter converts dots to underscores.

use std::sync::LazyLock;

use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{global, KeyValue};

static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("incident_bridge"));

// ============================================================================
// Inbound Commands
// ============================================================================

/// Total inbound commands, by filter outcome (accepted, ignored, malformed).
pub static COMMAND_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("incident_bridge.command.total")
        .with_description("Total inbound commands processed")
        .build()
});

// ============================================================================
// Dispatch
// ============================================================================

/// Total incident updates, by outcome.
pub static DISPATCH_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("incident_bridge.dispatch.total")
        .with_description("Total incident updates dispatched to the domain service")
        .build()
});

/// Duration of incident updates, including the wait for a free slot.
pub static DISPATCH_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("incident_bridge.dispatch.duration")
        .with_description("Incident update duration")
        .with_unit("s")
        .build()
});

// ============================================================================
// Event Publication
// ============================================================================

/// Total outgoing event publish operations.
pub static EVENT_PUBLISH_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("incident_bridge.event.publish.total")
        .with_description("Total outgoing event publish operations")
        .build()
});

// ============================================================================
// Dead Letter Queue
// ============================================================================

/// Total DLQ publish operations.
pub static DLQ_PUBLISH_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("incident_bridge.dlq.publish.total")
        .with_description("Total DLQ publish operations")
        .build()
});

// ============================================================================
// Helper
// ============================================================================

/// Create an outcome label.
pub fn outcome_attr(outcome: &str) -> KeyValue {
    KeyValue::new("outcome", outcome.to_string())
}

/// Create a message_type label.
pub fn message_type_attr(message_type: &str) -> KeyValue {
    KeyValue::new("message_type", message_type.to_string())
}

/// Create a reason_type label for DLQ entries.
pub fn reason_type_attr(reason_type: &str) -> KeyValue {
    KeyValue::new("reason_type", reason_type.to_string())
}

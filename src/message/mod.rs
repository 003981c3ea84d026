//! Wire-level message shapes.
//!
//! - [`Envelope`]: an inbound command that passed the filter
//! - [`OutgoingEnvelope`]: the fixed envelope every published event uses
//! - [`Incident`]: the domain entity carried by both

pub mod event;
pub mod incident;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

pub use event::IncidentUpdatedEvent;
pub use incident::{Coordinate, DecodeError, Incident};

/// Command type accepted by default.
pub const UPDATE_INCIDENT_COMMAND: &str = "UpdateIncidentCommand";
/// Event type of every published event.
pub const INCIDENT_UPDATED_EVENT: &str = "IncidentUpdatedEvent";
/// Identity stamped into the `sender` field of published events.
pub const SERVICE_IDENTITY: &str = "IncidentService";
/// Nested body field that carries the incident document.
pub const INCIDENT_FIELD: &str = "incident";

/// Inbound command that carries an accepted type and the required nested
/// entity document.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    message_type: String,
    body: Map<String, Value>,
    entity_field: String,
}

impl Envelope {
    /// Build an envelope, or `None` when `body[entity_field]` is missing or
    /// is not a document.
    pub fn new(
        message_type: impl Into<String>,
        body: Map<String, Value>,
        entity_field: impl Into<String>,
    ) -> Option<Self> {
        let entity_field = entity_field.into();
        if !body.get(&entity_field).is_some_and(Value::is_object) {
            return None;
        }
        Some(Self {
            message_type: message_type.into(),
            body,
            entity_field,
        })
    }

    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// The nested entity document.
    pub fn entity(&self) -> &Value {
        // Presence is checked in `new`.
        self.body.get(&self.entity_field).unwrap_or(&Value::Null)
    }
}

/// Envelope wrapped around every outgoing event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingEnvelope<T> {
    pub id: Uuid,
    pub message_type: String,
    pub sender: String,
    /// Epoch milliseconds at which the envelope was built.
    pub timestamp: i64,
    pub body: T,
}

impl<T: Serialize> OutgoingEnvelope<T> {
    pub fn new(message_type: impl Into<String>, sender: impl Into<String>, body: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            message_type: message_type.into(),
            sender: sender.into(),
            timestamp: Utc::now().timestamp_millis(),
            body,
        }
    }
}

impl OutgoingEnvelope<IncidentUpdatedEvent> {
    /// Build the `IncidentUpdatedEvent` announcing an updated incident.
    pub fn incident_updated(incident: Incident) -> Self {
        Self::new(
            INCIDENT_UPDATED_EVENT,
            SERVICE_IDENTITY,
            IncidentUpdatedEvent::from(incident),
        )
    }
}

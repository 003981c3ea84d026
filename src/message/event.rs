//! Outgoing event payloads.

use serde::Serialize;

use super::incident::{Coordinate, Incident};

/// Body of an `IncidentUpdatedEvent`.
///
/// Field-for-field remap of [`Incident`]; the only rename is `id` to
/// `incidentId`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentUpdatedEvent {
    pub incident_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<Coordinate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medical_needed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_of_people: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victim_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub victim_phone_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl From<Incident> for IncidentUpdatedEvent {
    fn from(incident: Incident) -> Self {
        Self {
            incident_id: incident.id,
            lat: incident.lat,
            lon: incident.lon,
            medical_needed: incident.medical_needed,
            number_of_people: incident.number_of_people,
            timestamp: incident.timestamp,
            victim_name: incident.victim_name,
            victim_phone_number: incident.victim_phone_number,
            status: incident.status,
        }
    }
}

//! Incident domain entity as carried on the wire.
//!
//! The incident itself is owned by the external incident service; the bridge
//! only ever holds the transient copy decoded from a command and the updated
//! copy the service hands back.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Number, Value};

/// Errors raised while decoding an incident document.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid incident document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Incident document has an empty id")]
    EmptyId,
}

/// A latitude or longitude.
///
/// Commands carry coordinates either as JSON numbers or as numeric strings
/// (`"34.2104"`); both decode to the same value. The digits are kept exactly
/// as received and always encode as a JSON number.
#[derive(Debug, Clone, PartialEq)]
pub struct Coordinate(Number);

impl Coordinate {
    pub fn as_number(&self) -> &Number {
        &self.0
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.0.as_f64()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("'{0}' is not a decimal coordinate")]
pub struct InvalidCoordinate(String);

impl FromStr for Coordinate {
    type Err = InvalidCoordinate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<Number>()
            .map(Self)
            .map_err(|_| InvalidCoordinate(s.to_string()))
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Coordinate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => Ok(Self(n)),
            Value::String(s) => s.parse().map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "expected a decimal coordinate, found {}",
                other
            ))),
        }
    }
}

/// Incident as exchanged with commands, the incident service and events.
///
/// Only `id` is mandatory. Update commands may carry a subset of the fields;
/// absent fields stay absent and are left out when re-encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incident {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_needed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_people: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim_phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl Incident {
    /// Create an incident carrying only its id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            lat: None,
            lon: None,
            medical_needed: None,
            number_of_people: None,
            victim_name: None,
            victim_phone_number: None,
            status: None,
            timestamp: None,
        }
    }

    /// Decode an incident from the nested `incident` document of a command.
    pub fn from_document(document: &Value) -> Result<Self, DecodeError> {
        let incident = Incident::deserialize(document)?;
        if incident.id.trim().is_empty() {
            return Err(DecodeError::EmptyId);
        }
        Ok(incident)
    }

    /// Overlay every field present in `patch` onto `self`.
    ///
    /// The id is never changed.
    pub fn apply(&mut self, patch: &Incident) {
        fn overlay<T: Clone>(target: &mut Option<T>, source: &Option<T>) {
            if let Some(value) = source {
                *target = Some(value.clone());
            }
        }

        overlay(&mut self.lat, &patch.lat);
        overlay(&mut self.lon, &patch.lon);
        overlay(&mut self.medical_needed, &patch.medical_needed);
        overlay(&mut self.number_of_people, &patch.number_of_people);
        overlay(&mut self.victim_name, &patch.victim_name);
        overlay(&mut self.victim_phone_number, &patch.victim_phone_number);
        overlay(&mut self.status, &patch.status);
        overlay(&mut self.timestamp, &patch.timestamp);
    }
}

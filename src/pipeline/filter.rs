//! Envelope filter: the gate between raw payloads and the dispatcher.

use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::message::Envelope;

/// Result of inspecting one raw payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Accepted type with the required nested document.
    Accepted(Envelope),
    /// Well-formed, but not a command this pipeline handles.
    Ignored { message_type: Option<String> },
    /// Not JSON, not a document, or a non-string `messageType`.
    Malformed(String),
}

impl Verdict {
    pub fn into_envelope(self) -> Option<Envelope> {
        match self {
            Verdict::Accepted(envelope) => Some(envelope),
            _ => None,
        }
    }

    /// Metric label for this verdict.
    pub fn outcome(&self) -> &'static str {
        match self {
            Verdict::Accepted(_) => "accepted",
            Verdict::Ignored { .. } => "ignored",
            Verdict::Malformed(_) => "malformed",
        }
    }
}

/// Accepts payloads whose `messageType` is in the allow-list and whose
/// `body` carries the required nested document.
#[derive(Debug, Clone)]
pub struct EnvelopeFilter {
    accepted: HashSet<String>,
    required_field: String,
}

impl EnvelopeFilter {
    pub fn new<I, S>(accepted: I, required_field: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            accepted: accepted.into_iter().map(Into::into).collect(),
            required_field: required_field.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            accepted: config.accepted_set(),
            required_field: config.required_body_field.clone(),
        }
    }

    /// The envelope, when the payload should be dispatched.
    pub fn accept(&self, raw: &[u8]) -> Option<Envelope> {
        self.inspect(raw).into_envelope()
    }

    /// Classify a payload, logging every rejection.
    pub fn inspect(&self, raw: &[u8]) -> Verdict {
        let verdict = self.classify(raw);
        match &verdict {
            Verdict::Accepted(envelope) => {
                debug!(message_type = %envelope.message_type(), "Message accepted");
            }
            Verdict::Ignored { message_type } => {
                debug!(
                    "Message with type '{}' is ignored",
                    message_type.as_deref().unwrap_or("<none>")
                );
            }
            Verdict::Malformed(reason) => {
                warn!(
                    reason = %reason,
                    payload = %String::from_utf8_lossy(raw),
                    "Unexpected message format"
                );
            }
        }

        verdict
    }

    fn classify(&self, raw: &[u8]) -> Verdict {
        let document: Value = match serde_json::from_slice(raw) {
            Ok(document) => document,
            Err(e) => return Verdict::Malformed(format!("invalid JSON: {}", e)),
        };
        let Value::Object(mut document) = document else {
            return Verdict::Malformed("payload is not a JSON object".to_string());
        };

        let message_type = match document.get("messageType") {
            None | Some(Value::Null) => return Verdict::Ignored { message_type: None },
            Some(Value::String(message_type)) => message_type.clone(),
            Some(_) => return Verdict::Malformed("messageType is not a string".to_string()),
        };

        if !self.accepted.contains(&message_type) {
            return Verdict::Ignored {
                message_type: Some(message_type),
            };
        }

        let body = match document.remove("body") {
            Some(Value::Object(body)) => body,
            _ => {
                return Verdict::Ignored {
                    message_type: Some(message_type),
                }
            }
        };

        match Envelope::new(message_type.clone(), body, self.required_field.as_str()) {
            Some(envelope) => Verdict::Accepted(envelope),
            None => Verdict::Ignored {
                message_type: Some(message_type),
            },
        }
    }
}

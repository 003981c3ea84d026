//! incident-bridge - incident command-to-event bridge
//!
//! Consumes `UpdateIncidentCommand` messages, hands the embedded incident to
//! the incident service on a blocking thread, and publishes the updated
//! incident as an `IncidentUpdatedEvent`. Commands are acknowledged as soon
//! as their update is submitted; events are published when it settles.

pub mod bus;
pub mod config;
pub mod dlq;
pub mod message;
pub mod pipeline;
pub mod service;
pub mod utils;

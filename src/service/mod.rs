//! Incident service boundary.
//!
//! The incident service owns incident state; the bridge hands it the decoded
//! command entity and publishes whatever it returns. Calls are synchronous and
//! may block, so the pipeline only ever invokes them from the blocking pool.
//!
//! Implementations:
//! - `HttpIncidentService`: remote incident service over HTTP
//! - `InMemoryIncidentService`: map-backed service for local runs and tests

pub mod http;
pub mod in_memory;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::message::Incident;

pub use http::HttpIncidentService;
pub use in_memory::InMemoryIncidentService;

/// Errors reported by an incident service.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("Incident '{0}' not found")]
    NotFound(String),

    #[error("Update rejected: {0}")]
    Rejected(String),

    #[error("Incident service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid response from incident service: {0}")]
    InvalidResponse(String),
}

/// Synchronous incident update operation.
///
/// Must be safe to call concurrently from several update tasks.
pub trait IncidentService: Send + Sync {
    /// Apply the command entity and return the updated incident.
    fn update_incident(&self, incident: Incident) -> Result<Incident, ServiceError>;
}

// ============================================================================
// Configuration
// ============================================================================

/// Incident service type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    /// Remote incident service over HTTP.
    #[default]
    Http,
    /// In-process map, for local development.
    InMemory,
}

/// Incident service configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service type discriminator.
    #[serde(rename = "type")]
    pub service_type: ServiceType,
    /// HTTP-specific configuration.
    pub http: HttpServiceConfig,
    /// In-memory-specific configuration.
    pub in_memory: InMemoryServiceConfig,
}

/// HTTP incident service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpServiceConfig {
    /// Base URL of the incident service (e.g. `http://incident-service:8080`).
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for HttpServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_ms: 5_000,
        }
    }
}

impl HttpServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// In-memory incident service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InMemoryServiceConfig {
    /// Store incidents the service has never seen instead of failing with
    /// `NotFound`.
    pub create_missing: bool,
}

impl Default for InMemoryServiceConfig {
    fn default() -> Self {
        Self {
            create_missing: true,
        }
    }
}

/// Build the incident service selected by configuration.
///
/// Must be called from within a tokio runtime: the HTTP service captures the
/// current runtime handle.
pub fn init_incident_service(
    config: &ServiceConfig,
) -> Result<Arc<dyn IncidentService>, ServiceError> {
    match config.service_type {
        ServiceType::Http => {
            let service = HttpIncidentService::new(
                &config.http.base_url,
                config.http.request_timeout(),
            )?;
            info!(
                service_type = "http",
                base_url = %config.http.base_url,
                "Incident service initialized"
            );
            Ok(Arc::new(service))
        }
        ServiceType::InMemory => {
            let service = if config.in_memory.create_missing {
                InMemoryIncidentService::creating_missing()
            } else {
                InMemoryIncidentService::new()
            };
            info!(
                service_type = "in_memory",
                create_missing = config.in_memory.create_missing,
                "Incident service initialized"
            );
            Ok(Arc::new(service))
        }
    }
}

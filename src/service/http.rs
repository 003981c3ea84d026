//! HTTP incident service client.
//!
//! `PUT {base_url}/incidents/{id}` with the incident document; the service
//! answers with the updated incident.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use tokio::runtime::Handle;
use tracing::debug;

use super::{IncidentService, ServiceError};
use crate::message::Incident;

/// Incident service reached over HTTP.
///
/// The client is async; [`IncidentService::update_incident`] drives it to
/// completion on the runtime captured at construction. It must therefore be
/// called from a blocking-pool thread (`spawn_blocking`), never from an async
/// task.
pub struct HttpIncidentService {
    client: reqwest::Client,
    base_url: Url,
    runtime: Handle,
}

impl HttpIncidentService {
    /// Create a client for the service at `base_url`.
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, ServiceError> {
        let runtime = Handle::try_current()
            .map_err(|e| ServiceError::Unavailable(format!("No tokio runtime: {}", e)))?;

        let base_url = Url::parse(base_url).map_err(|e| {
            ServiceError::Unavailable(format!("Invalid base URL '{}': {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ServiceError::Unavailable(format!(
                "Base URL '{}' cannot carry a path",
                base_url
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ServiceError::Unavailable(format!("Failed to build client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            runtime,
        })
    }

    /// Resource URL of one incident.
    pub fn incident_url(&self, id: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("incidents").push(id);
        }
        url
    }

    async fn put_incident(&self, incident: Incident) -> Result<Incident, ServiceError> {
        let url = self.incident_url(&incident.id);

        let response = self
            .client
            .put(url.clone())
            .json(&incident)
            .send()
            .await
            .map_err(|e| ServiceError::Unavailable(e.to_string()))?;

        let status = response.status();
        debug!(url = %url, status = %status, "Incident service responded");

        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(incident.id));
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ServiceError::Rejected(format!("{}: {}", status, detail)));
        }

        response
            .json::<Incident>()
            .await
            .map_err(|e| ServiceError::InvalidResponse(e.to_string()))
    }
}

impl IncidentService for HttpIncidentService {
    fn update_incident(&self, incident: Incident) -> Result<Incident, ServiceError> {
        self.runtime.block_on(self.put_incident(incident))
    }
}

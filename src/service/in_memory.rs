//! In-memory incident service.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, warn};

use super::{IncidentService, ServiceError};
use crate::message::Incident;

/// Map-backed incident service.
///
/// Updates overlay the fields present in the command onto the stored
/// incident. Unknown incidents fail with `NotFound` unless the service was
/// built with [`InMemoryIncidentService::creating_missing`].
#[derive(Default)]
pub struct InMemoryIncidentService {
    incidents: RwLock<HashMap<String, Incident>>,
    create_missing: bool,
}

impl InMemoryIncidentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// A service that stores unknown incidents instead of rejecting them.
    pub fn creating_missing() -> Self {
        Self {
            incidents: RwLock::new(HashMap::new()),
            create_missing: true,
        }
    }

    /// Seed an incident.
    pub fn insert(&self, incident: Incident) {
        let mut incidents = self
            .incidents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        incidents.insert(incident.id.clone(), incident);
    }

    pub fn get(&self, id: &str) -> Option<Incident> {
        self.incidents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.incidents
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IncidentService for InMemoryIncidentService {
    fn update_incident(&self, incident: Incident) -> Result<Incident, ServiceError> {
        let mut incidents = self
            .incidents
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        match incidents.get_mut(&incident.id) {
            Some(stored) => {
                stored.apply(&incident);
                debug!(incident_id = %stored.id, "Incident updated");
                Ok(stored.clone())
            }
            None if self.create_missing => {
                debug!(incident_id = %incident.id, "Incident created on update");
                incidents.insert(incident.id.clone(), incident.clone());
                Ok(incident)
            }
            None => {
                warn!(incident_id = %incident.id, "Incident not found");
                Err(ServiceError::NotFound(incident.id))
            }
        }
    }
}

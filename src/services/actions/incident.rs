//! Incident actions backed by the store.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::params::{present, required_parsed, str_param, string_list, string_or};
use super::ActionHandler;
use crate::db::store::Store;
use crate::errors::ActionError;
use crate::models::event::SeverityLevel;
use crate::models::incident::{IncidentStatus, NewIncident, UpdateIncident as IncidentUpdate};
use crate::models::value::{Params, Value};

pub struct CreateIncident {
    store: Arc<dyn Store>,
}

impl CreateIncident {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for CreateIncident {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
        let severity = str_param(params, "severity")
            .or_else(|| str_param(params, "priority"))
            .and_then(SeverityLevel::parse)
            .unwrap_or(SeverityLevel::Medium);

        let related_events = string_list(params, "related_events")
            .iter()
            .map(|id| {
                Uuid::parse_str(id)
                    .map_err(|_| ActionError::InvalidParams(format!("related event id is not a UUID: {id}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let incident = self
            .store
            .insert_incident(NewIncident {
                severity,
                category: string_or(params, "category", ""),
                title: string_or(params, "title", "Automated Incident"),
                description: string_or(params, "description", ""),
                triggered_by_rule: str_param(params, "triggered_by_rule").map(str::to_string),
                related_events,
            })
            .await
            .map_err(ActionError::Incident)?;

        tracing::info!(incident_id = %incident.incident_id, severity = %incident.severity, "Created incident");

        Ok(Value::map([(
            "incident_id",
            Value::from(incident.incident_id.to_string()),
        )]))
    }
}

pub struct UpdateIncident {
    store: Arc<dyn Store>,
}

impl UpdateIncident {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ActionHandler for UpdateIncident {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
        let id: Uuid = required_parsed(params, "incident_id")?;

        let status = match present(params, "status") {
            None => None,
            Some(raw) => Some(
                raw.as_str()
                    .and_then(IncidentStatus::parse)
                    .ok_or_else(|| ActionError::InvalidParams(format!("unknown incident status: {raw}")))?,
            ),
        };

        let update = IncidentUpdate {
            status,
            assigned_to: str_param(params, "assigned_to").map(str::to_string),
            notes: str_param(params, "notes").map(str::to_string),
        };

        let updated = self
            .store
            .update_incident(id, &update)
            .await
            .map_err(ActionError::Incident)?;
        if updated.is_none() {
            return Err(ActionError::InvalidParams(format!("incident not found: {id}")));
        }

        tracing::info!(incident_id = %id, "Updated incident");

        Ok(Value::map([
            ("incident_id", Value::from(id.to_string())),
            ("status", Value::from("updated")),
        ]))
    }
}

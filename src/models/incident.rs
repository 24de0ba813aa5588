//! Incident model and status enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::event::SeverityLevel;

/// Incident status. Ordered `open → investigating → contained → resolved` in
/// normal operation, but any value may be set by an update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "incident_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    #[default]
    Open,
    Investigating,
    Contained,
    Resolved,
}

impl IncidentStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "investigating" => Some(Self::Investigating),
            "contained" => Some(Self::Contained),
            "resolved" => Some(Self::Resolved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Incident {
    pub incident_id: Uuid,
    pub status: IncidentStatus,
    pub severity: SeverityLevel,
    pub category: String,
    pub title: String,
    pub description: String,
    pub triggered_by_rule: Option<String>,
    #[sqlx(json)]
    pub related_events: Vec<Uuid>,
    pub notes: String,
    pub assigned_to: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an incident.
#[derive(Debug, Clone, Default)]
pub struct NewIncident {
    pub severity: SeverityLevel,
    pub category: String,
    pub title: String,
    pub description: String,
    pub triggered_by_rule: Option<String>,
    pub related_events: Vec<Uuid>,
}

/// Partial update; `notes` is appended to the existing log, never replacing it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateIncident {
    pub status: Option<IncidentStatus>,
    pub assigned_to: Option<String>,
    pub notes: Option<String>,
}

impl UpdateIncident {
    pub fn is_empty(&self) -> bool {
        self.status.is_none() && self.assigned_to.is_none() && self.notes.is_none()
    }
}

/// Append a note to an existing newline-separated note log.
pub fn append_note(existing: &str, note: &str) -> String {
    if existing.is_empty() {
        note.to_string()
    } else {
        format!("{existing}\n{note}")
    }
}

/// Filters for listing incidents.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IncidentFilters {
    pub status: Option<IncidentStatus>,
    pub severity: Option<SeverityLevel>,
}

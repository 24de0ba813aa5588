//! Security/operational event model and severity enum.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::models::value::Value;

// -- Enums matching PostgreSQL --

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "severity_level", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SeverityLevel {
    #[default]
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse a severity name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Well-known event attributes addressable by name in rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventColumn {
    EventType,
    Source,
    Severity,
}

impl EventColumn {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "event_type" => Some(Self::EventType),
            "source" => Some(Self::Source),
            "severity" => Some(Self::Severity),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EventType => "event_type",
            Self::Source => "source",
            Self::Severity => "severity",
        }
    }

    /// Read this attribute off an event as a string.
    pub fn read<'a>(&self, event: &'a Event) -> &'a str {
        match self {
            Self::EventType => &event.event_type,
            Self::Source => &event.source,
            Self::Severity => event.severity.as_str(),
        }
    }
}

// -- Event --

/// An ingested event. Immutable once persisted except for `processed_at`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub event_type: String,
    pub severity: SeverityLevel,
    pub raw_data: Option<serde_json::Value>,
    pub normalized: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Event {
    /// Normalized payload as a [`Value`]; non-object payloads become an empty map.
    pub fn normalized_value(&self) -> Value {
        match Value::from(&self.normalized) {
            v @ Value::Map(_) => v,
            _ => Value::Map(Default::default()),
        }
    }
}

/// Request body for ingesting an event.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateEvent {
    #[validate(length(min = 1, max = 100, message = "event_type must be 1-100 characters"))]
    pub event_type: String,
    #[validate(length(min = 1, max = 100, message = "source must be 1-100 characters"))]
    pub source: String,
    pub severity: Option<SeverityLevel>,
    pub raw_data: Option<serde_json::Value>,
    #[serde(default = "empty_object")]
    #[validate(custom(function = "validate_normalized"))]
    pub normalized: serde_json::Value,
}

fn validate_normalized(normalized: &serde_json::Value) -> Result<(), ValidationError> {
    if normalized.is_object() {
        Ok(())
    } else {
        Err(ValidationError::new("object").with_message("normalized must be a JSON object".into()))
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(Default::default())
}

/// Fully-formed event ready to persist; id and timestamp are assigned here once.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub event_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub event_type: String,
    pub severity: SeverityLevel,
    pub raw_data: Option<serde_json::Value>,
    pub normalized: serde_json::Value,
}

impl From<CreateEvent> for NewEvent {
    fn from(req: CreateEvent) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: req.source,
            event_type: req.event_type,
            severity: req.severity.unwrap_or_default(),
            raw_data: req.raw_data,
            normalized: req.normalized,
        }
    }
}

/// Filters for listing events.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct EventFilters {
    pub event_type: Option<String>,
    pub severity: Option<SeverityLevel>,
}

//! Action execution audit log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "action_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One row per dispatcher invocation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActionLog {
    pub action_id: Uuid,
    pub action_type: String,
    pub status: ActionStatus,
    pub incident_id: Option<Uuid>,
    pub playbook_id: Option<String>,
    pub step_id: Option<String>,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_time_ms: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewActionLog {
    pub action_type: String,
    pub status: ActionStatus,
    pub incident_id: Option<Uuid>,
    pub playbook_id: Option<String>,
    pub step_id: Option<String>,
    pub parameters: serde_json::Value,
}

/// Terminal state written once the handler returns.
#[derive(Debug, Clone)]
pub struct ActionCompletion {
    pub status: ActionStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_time_ms: i64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActionLogFilters {
    pub status: Option<ActionStatus>,
    pub action_type: Option<String>,
}

//! Persistence boundary consumed by the engines.
//!
//! The engines only need create/read/update-by-id on events, incidents and
//! action logs plus one windowed count query; single-row updates are assumed
//! atomic, nothing here spans rows in a transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::action_log::{ActionCompletion, ActionLog, ActionLogFilters, NewActionLog};
use crate::models::event::{Event, EventColumn, EventFilters, NewEvent};
use crate::models::incident::{Incident, IncidentFilters, NewIncident, UpdateIncident};

/// What `count_distinct` counts distinct values of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CountKey {
    Column(EventColumn),
    /// Dot-separated path into the normalized payload.
    Payload(String),
}

impl CountKey {
    pub fn parse(field: &str) -> Self {
        match EventColumn::parse(field) {
            Some(column) => Self::Column(column),
            None => Self::Payload(field.to_string()),
        }
    }
}

/// Events with `since <= timestamp <= until` and `column = value`.
#[derive(Debug, Clone)]
pub struct WindowQuery {
    pub column: EventColumn,
    pub value: String,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub distinct: Option<CountKey>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Stats {
    pub events: i64,
    pub incidents: i64,
    pub actions: i64,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError>;

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError>;

    /// Newest first. Returns the page and the total matching count.
    async fn list_events(
        &self,
        filters: &EventFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Event>, i64), StoreError>;

    async fn count_window(&self, query: &WindowQuery) -> Result<i64, StoreError>;

    /// Stamp `processed_at` unless it is already set.
    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait IncidentStore: Send + Sync {
    async fn insert_incident(&self, incident: NewIncident) -> Result<Incident, StoreError>;

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, StoreError>;

    async fn list_incidents(
        &self,
        filters: &IncidentFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Incident>, i64), StoreError>;

    /// Apply a partial update; `None` when the incident does not exist.
    async fn update_incident(
        &self,
        id: Uuid,
        update: &UpdateIncident,
    ) -> Result<Option<Incident>, StoreError>;
}

#[async_trait]
pub trait ActionLogStore: Send + Sync {
    async fn start_action(&self, log: NewActionLog) -> Result<ActionLog, StoreError>;

    async fn finish_action(&self, id: Uuid, completion: ActionCompletion)
        -> Result<(), StoreError>;

    async fn list_actions(
        &self,
        filters: &ActionLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ActionLog>, i64), StoreError>;
}

#[async_trait]
pub trait Store: EventStore + IncidentStore + ActionLogStore {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn stats(&self) -> Result<Stats, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_key_prefers_columns() {
        assert_eq!(CountKey::parse("source"), CountKey::Column(EventColumn::Source));
        assert_eq!(
            CountKey::parse("src.ip"),
            CountKey::Payload("src.ip".to_string())
        );
    }
}

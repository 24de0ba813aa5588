//! In-process [`Store`] used by tests and by `DATABASE_URL=memory`.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::store::{
    ActionLogStore, CountKey, EventStore, IncidentStore, Stats, Store, WindowQuery,
};
use crate::errors::StoreError;
use crate::models::action_log::{ActionCompletion, ActionLog, ActionLogFilters, NewActionLog};
use crate::models::event::{Event, EventFilters, NewEvent};
use crate::models::incident::{append_note, Incident, IncidentFilters, NewIncident, UpdateIncident};
use crate::models::value::Value;

#[derive(Debug, Default)]
struct Tables {
    events: Vec<Event>,
    incidents: Vec<Incident>,
    actions: Vec<ActionLog>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every action log row, oldest first.
    pub async fn action_logs(&self) -> Vec<ActionLog> {
        self.tables.read().await.actions.clone()
    }

    /// Snapshot of every incident, oldest first.
    pub async fn incidents(&self) -> Vec<Incident> {
        self.tables.read().await.incidents.clone()
    }
}

fn page<T: Clone>(rows: Vec<&T>, limit: i64, offset: i64) -> (Vec<T>, i64) {
    let total = rows.len() as i64;
    let items = rows
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .cloned()
        .collect();
    (items, total)
}

/// String form of the distinct key for one event; `None` mirrors SQL NULL.
fn distinct_value(event: &Event, key: &CountKey) -> Option<String> {
    match key {
        CountKey::Column(column) => Some(column.read(event).to_string()),
        CountKey::Payload(path) => match event.normalized_value().get_path(path) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v.to_string()),
        },
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let row = Event {
            event_id: event.event_id,
            timestamp: event.timestamp,
            source: event.source,
            event_type: event.event_type,
            severity: event.severity,
            raw_data: event.raw_data,
            normalized: event.normalized,
            created_at: Utc::now(),
            processed_at: None,
        };
        self.tables.write().await.events.push(row.clone());
        Ok(row)
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.events.iter().find(|e| e.event_id == id).cloned())
    }

    async fn list_events(
        &self,
        filters: &EventFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Event>, i64), StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Event> = tables
            .events
            .iter()
            .filter(|e| {
                filters
                    .event_type
                    .as_ref()
                    .map_or(true, |t| &e.event_type == t)
                    && filters.severity.map_or(true, |s| e.severity == s)
            })
            .collect();
        rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(page(rows, limit, offset))
    }

    async fn count_window(&self, query: &WindowQuery) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        let in_window = tables.events.iter().filter(|e| {
            e.timestamp >= query.since
                && e.timestamp <= query.until
                && query.column.read(e) == query.value
        });
        let count = match &query.distinct {
            None => in_window.count(),
            Some(key) => in_window
                .filter_map(|e| distinct_value(e, key))
                .collect::<HashSet<_>>()
                .len(),
        };
        Ok(count as i64)
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(event) = tables.events.iter_mut().find(|e| e.event_id == id) {
            event.processed_at.get_or_insert(at);
        }
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for MemoryStore {
    async fn insert_incident(&self, incident: NewIncident) -> Result<Incident, StoreError> {
        let now = Utc::now();
        let row = Incident {
            incident_id: Uuid::new_v4(),
            status: Default::default(),
            severity: incident.severity,
            category: incident.category,
            title: incident.title,
            description: incident.description,
            triggered_by_rule: incident.triggered_by_rule,
            related_events: incident.related_events,
            notes: String::new(),
            assigned_to: None,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.incidents.push(row.clone());
        Ok(row)
    }

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.incidents.iter().find(|i| i.incident_id == id).cloned())
    }

    async fn list_incidents(
        &self,
        filters: &IncidentFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Incident>, i64), StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Incident> = tables
            .incidents
            .iter()
            .filter(|i| {
                filters.status.map_or(true, |s| i.status == s)
                    && filters.severity.map_or(true, |s| i.severity == s)
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, offset))
    }

    async fn update_incident(
        &self,
        id: Uuid,
        update: &UpdateIncident,
    ) -> Result<Option<Incident>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(incident) = tables.incidents.iter_mut().find(|i| i.incident_id == id) else {
            return Ok(None);
        };
        if let Some(status) = update.status {
            incident.status = status;
        }
        if let Some(assigned_to) = &update.assigned_to {
            incident.assigned_to = Some(assigned_to.clone());
        }
        if let Some(note) = &update.notes {
            incident.notes = append_note(&incident.notes, note);
        }
        incident.updated_at = Utc::now();
        Ok(Some(incident.clone()))
    }
}

#[async_trait]
impl ActionLogStore for MemoryStore {
    async fn start_action(&self, log: NewActionLog) -> Result<ActionLog, StoreError> {
        let row = ActionLog {
            action_id: Uuid::new_v4(),
            action_type: log.action_type,
            status: log.status,
            incident_id: log.incident_id,
            playbook_id: log.playbook_id,
            step_id: log.step_id,
            parameters: log.parameters,
            result: None,
            error: None,
            execution_time_ms: 0,
            created_at: Utc::now(),
            completed_at: None,
        };
        self.tables.write().await.actions.push(row.clone());
        Ok(row)
    }

    async fn finish_action(
        &self,
        id: Uuid,
        completion: ActionCompletion,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(row) = tables.actions.iter_mut().find(|a| a.action_id == id) {
            row.status = completion.status;
            row.result = completion.result;
            row.error = completion.error;
            row.execution_time_ms = completion.execution_time_ms;
            row.completed_at = Some(completion.completed_at);
        }
        Ok(())
    }

    async fn list_actions(
        &self,
        filters: &ActionLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ActionLog>, i64), StoreError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&ActionLog> = tables
            .actions
            .iter()
            .filter(|a| {
                filters.status.map_or(true, |s| a.status == s)
                    && filters
                        .action_type
                        .as_ref()
                        .map_or(true, |t| &a.action_type == t)
            })
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, limit, offset))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        let tables = self.tables.read().await;
        Ok(Stats {
            events: tables.events.len() as i64,
            incidents: tables.incidents.len() as i64,
            actions: tables.actions.len() as i64,
        })
    }
}

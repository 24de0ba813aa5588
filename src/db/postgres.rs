//! PostgreSQL-backed [`Store`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::store::{
    ActionLogStore, CountKey, EventStore, IncidentStore, Stats, Store, WindowQuery,
};
use crate::errors::StoreError;
use crate::models::action_log::{ActionCompletion, ActionLog, ActionLogFilters, NewActionLog};
use crate::models::event::{Event, EventColumn, EventFilters, NewEvent};
use crate::models::incident::{Incident, IncidentFilters, NewIncident, UpdateIncident};

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Column expression compared as text; enum columns need a cast.
fn text_expr(column: EventColumn) -> &'static str {
    match column {
        EventColumn::EventType => "event_type",
        EventColumn::Source => "source",
        EventColumn::Severity => "severity::text",
    }
}

#[async_trait]
impl EventStore for PgStore {
    async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let row = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (event_id, timestamp, source, event_type, severity, raw_data, normalized)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(event.event_id)
        .bind(event.timestamp)
        .bind(&event.source)
        .bind(&event.event_type)
        .bind(event.severity)
        .bind(&event.raw_data)
        .bind(&event.normalized)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
        let row = sqlx::query_as::<_, Event>("SELECT * FROM events WHERE event_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_events(
        &self,
        filters: &EventFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Event>, i64), StoreError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM events
            WHERE ($1::text IS NULL OR event_type = $1)
              AND ($2::severity_level IS NULL OR severity = $2)
            "#,
        )
        .bind(&filters.event_type)
        .bind(filters.severity)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, Event>(
            r#"
            SELECT * FROM events
            WHERE ($1::text IS NULL OR event_type = $1)
              AND ($2::severity_level IS NULL OR severity = $2)
            ORDER BY timestamp DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(&filters.event_type)
        .bind(filters.severity)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }

    async fn count_window(&self, query: &WindowQuery) -> Result<i64, StoreError> {
        let aggregate = match &query.distinct {
            None => "COUNT(*)".to_string(),
            Some(CountKey::Column(column)) => format!("COUNT(DISTINCT {})", text_expr(*column)),
            Some(CountKey::Payload(_)) => "COUNT(DISTINCT normalized #>> $4)".to_string(),
        };
        let sql = format!(
            "SELECT {aggregate} FROM events WHERE timestamp >= $1 AND timestamp <= $2 AND {} = $3",
            text_expr(query.column)
        );

        let mut q = sqlx::query_scalar::<_, i64>(&sql)
            .bind(query.since)
            .bind(query.until)
            .bind(&query.value);
        if let Some(CountKey::Payload(path)) = &query.distinct {
            let segments: Vec<String> = path.split('.').map(str::to_string).collect();
            q = q.bind(segments);
        }
        Ok(q.fetch_one(&self.pool).await?)
    }

    async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE events SET processed_at = $2 WHERE event_id = $1 AND processed_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl IncidentStore for PgStore {
    async fn insert_incident(&self, incident: NewIncident) -> Result<Incident, StoreError> {
        let row = sqlx::query_as::<_, Incident>(
            r#"
            INSERT INTO incidents (severity, category, title, description, triggered_by_rule, related_events)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(incident.severity)
        .bind(&incident.category)
        .bind(&incident.title)
        .bind(&incident.description)
        .bind(&incident.triggered_by_rule)
        .bind(Json(&incident.related_events))
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, StoreError> {
        let row = sqlx::query_as::<_, Incident>("SELECT * FROM incidents WHERE incident_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_incidents(
        &self,
        filters: &IncidentFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Incident>, i64), StoreError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM incidents
            WHERE ($1::incident_status IS NULL OR status = $1)
              AND ($2::severity_level IS NULL OR severity = $2)
            "#,
        )
        .bind(filters.status)
        .bind(filters.severity)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, Incident>(
            r#"
            SELECT * FROM incidents
            WHERE ($1::incident_status IS NULL OR status = $1)
              AND ($2::severity_level IS NULL OR severity = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filters.status)
        .bind(filters.severity)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }

    async fn update_incident(
        &self,
        id: Uuid,
        update: &UpdateIncident,
    ) -> Result<Option<Incident>, StoreError> {
        let row = sqlx::query_as::<_, Incident>(
            r#"
            UPDATE incidents SET
                status = COALESCE($2, status),
                assigned_to = COALESCE($3, assigned_to),
                notes = CASE
                    WHEN $4::text IS NULL THEN notes
                    WHEN notes = '' THEN $4
                    ELSE notes || E'\n' || $4
                END,
                updated_at = NOW()
            WHERE incident_id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.status)
        .bind(&update.assigned_to)
        .bind(&update.notes)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl ActionLogStore for PgStore {
    async fn start_action(&self, log: NewActionLog) -> Result<ActionLog, StoreError> {
        let row = sqlx::query_as::<_, ActionLog>(
            r#"
            INSERT INTO action_logs (action_type, status, incident_id, playbook_id, step_id, parameters)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&log.action_type)
        .bind(log.status)
        .bind(log.incident_id)
        .bind(&log.playbook_id)
        .bind(&log.step_id)
        .bind(&log.parameters)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn finish_action(
        &self,
        id: Uuid,
        completion: ActionCompletion,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE action_logs
            SET status = $2, result = $3, error = $4, execution_time_ms = $5, completed_at = $6
            WHERE action_id = $1
            "#,
        )
        .bind(id)
        .bind(completion.status)
        .bind(&completion.result)
        .bind(&completion.error)
        .bind(completion.execution_time_ms)
        .bind(completion.completed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_actions(
        &self,
        filters: &ActionLogFilters,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<ActionLog>, i64), StoreError> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM action_logs
            WHERE ($1::action_status IS NULL OR status = $1)
              AND ($2::text IS NULL OR action_type = $2)
            "#,
        )
        .bind(filters.status)
        .bind(&filters.action_type)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, ActionLog>(
            r#"
            SELECT * FROM action_logs
            WHERE ($1::action_status IS NULL OR status = $1)
              AND ($2::text IS NULL OR action_type = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filters.status)
        .bind(&filters.action_type)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((rows, total))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<Stats, StoreError> {
        let (events, incidents, actions): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM events),
                (SELECT COUNT(*) FROM incidents),
                (SELECT COUNT(*) FROM action_logs)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(Stats {
            events,
            incidents,
            actions,
        })
    }
}

//! Event service: ingestion and lookup.

use uuid::Uuid;
use validator::Validate;

use crate::db::store::Store;
use crate::errors::AppError;
use crate::models::event::{CreateEvent, Event, EventFilters, NewEvent};
use crate::models::pagination::{PagedResult, Pagination};
use crate::services::queue::DetectionQueue;

/// Validate, persist and enqueue an event for detection.
///
/// The event is returned as soon as it is stored; evaluation happens on the
/// queue's workers.
pub async fn ingest(
    store: &dyn Store,
    queue: &DetectionQueue,
    req: CreateEvent,
) -> Result<Event, AppError> {
    req.validate()?;

    let event = store.insert_event(NewEvent::from(req)).await?;
    tracing::info!(
        event_id = %event.event_id,
        event_type = %event.event_type,
        source = %event.source,
        "Event ingested"
    );

    queue.submit(event.clone()).await?;
    Ok(event)
}

pub async fn find_by_id(store: &dyn Store, id: Uuid) -> Result<Event, AppError> {
    store
        .get_event(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Event not found".to_string()))
}

/// List events, newest first.
pub async fn list(
    store: &dyn Store,
    filters: &EventFilters,
    pagination: &Pagination,
) -> Result<PagedResult<Event>, AppError> {
    let (items, total) = store
        .list_events(filters, pagination.limit(), pagination.offset())
        .await?;
    Ok(PagedResult::new(items, total, pagination))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::db::memory::MemoryStore;
    use crate::models::event::SeverityLevel;
    use crate::services::actions::ActionDispatcher;
    use crate::services::detection::DetectionEngine;
    use crate::services::orchestrator::Orchestrator;
    use crate::services::queue::QueueOptions;

    fn queue(store: Arc<MemoryStore>) -> DetectionQueue {
        let dispatcher = Arc::new(ActionDispatcher::with_defaults(store.clone()));
        let detection = Arc::new(DetectionEngine::new(store, dispatcher.clone()));
        let orchestrator = Arc::new(Orchestrator::new(dispatcher));
        let (queue, _handle) = DetectionQueue::spawn(
            detection,
            orchestrator,
            QueueOptions {
                capacity: 4,
                workers: 1,
                playbook_workers: 1,
                auto_execute_playbooks: false,
            },
        );
        queue
    }

    fn request(event_type: &str, severity: Option<SeverityLevel>) -> CreateEvent {
        CreateEvent {
            event_type: event_type.to_string(),
            source: "sshd".to_string(),
            severity,
            raw_data: None,
            normalized: serde_json::json!({"user": "root"}),
        }
    }

    #[tokio::test]
    async fn ingest_persists_and_assigns_id() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue(store.clone());

        let event = ingest(&*store, &queue, request("authentication_failed", None))
            .await
            .unwrap();
        assert_eq!(event.severity, SeverityLevel::Info);

        let found = find_by_id(&*store, event.event_id).await.unwrap();
        assert_eq!(found.event_type, "authentication_failed");
    }

    #[tokio::test]
    async fn ingest_rejects_blank_event_type() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue(store.clone());

        let err = ingest(&*store, &queue, request("", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_event_is_not_found() {
        let store = MemoryStore::new();
        let err = find_by_id(&store, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_severity() {
        let store = Arc::new(MemoryStore::new());
        let queue = queue(store.clone());
        ingest(&*store, &queue, request("a", Some(SeverityLevel::High)))
            .await
            .unwrap();
        ingest(&*store, &queue, request("b", Some(SeverityLevel::Low)))
            .await
            .unwrap();

        let filters = EventFilters {
            severity: Some(SeverityLevel::High),
            ..Default::default()
        };
        let page = list(&*store, &filters, &Pagination::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].event_type, "a");
    }
}

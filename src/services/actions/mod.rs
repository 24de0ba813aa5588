//! Action dispatcher: name-to-handler registry with an audit row per call.
//!
//! Every dispatch writes an [`ActionLog`](crate::models::action_log::ActionLog)
//! row in `running` state before the handler is looked up, then finalizes the
//! same row with the outcome. Unknown action names therefore still leave a
//! `failed` row behind.

pub mod builtin;
pub mod http;
pub mod incident;
pub mod params;
pub mod process;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::db::store::Store;
use crate::errors::ActionError;
use crate::models::action_log::{ActionCompletion, ActionStatus, NewActionLog};
use crate::models::value::{Params, Value};

/// A single named action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError>;
}

/// Caller attribution recorded on the action log row.
#[derive(Debug, Clone, Default)]
pub struct DispatchContext {
    pub incident_id: Option<Uuid>,
    pub playbook_id: Option<String>,
    pub step_id: Option<String>,
}

impl DispatchContext {
    pub fn for_step(playbook_id: &str, step_id: &str) -> Self {
        Self {
            incident_id: None,
            playbook_id: Some(playbook_id.to_string()),
            step_id: Some(step_id.to_string()),
        }
    }
}

pub struct ActionDispatcher {
    store: Arc<dyn Store>,
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionDispatcher {
    /// Empty registry.
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Registry with every built-in handler.
    pub fn with_defaults(store: Arc<dyn Store>) -> Self {
        let client = reqwest::Client::new();
        let mut dispatcher = Self::new(store.clone());
        dispatcher.register(
            "create_incident",
            incident::CreateIncident::new(store.clone()),
        );
        dispatcher.register("update_incident", incident::UpdateIncident::new(store));
        dispatcher.register("notify", builtin::Notify);
        dispatcher.register("block_ip", builtin::BlockIp);
        dispatcher.register("log_action", builtin::LogAction);
        dispatcher.register("http_request", http::HttpRequest::new(client.clone()));
        dispatcher.register("webhook", http::Webhook::new(client));
        dispatcher.register("shell_script", process::ShellScript);
        dispatcher.register("python_script", process::PythonScript);
        dispatcher
    }

    /// Add or replace a handler.
    pub fn register(&mut self, name: &str, handler: impl ActionHandler + 'static) {
        tracing::debug!(action = name, "Registered action");
        self.handlers.insert(name.to_string(), Arc::new(handler));
    }

    pub fn action_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run `name` with `params`, recording the call in the action log.
    ///
    /// Fails with [`ActionError::Store`] without running the handler if the
    /// initial log row cannot be written.
    pub async fn dispatch(
        &self,
        name: &str,
        params: &Params,
        context: &DispatchContext,
    ) -> Result<Value, ActionError> {
        let started = Instant::now();
        let incident_id = context.incident_id.or_else(|| {
            params::str_param(params, "incident_id").and_then(|id| Uuid::parse_str(id).ok())
        });

        let log = self
            .store
            .start_action(NewActionLog {
                action_type: name.to_string(),
                status: ActionStatus::Running,
                incident_id,
                playbook_id: context.playbook_id.clone(),
                step_id: context.step_id.clone(),
                parameters: serde_json::Value::from(&Value::Map(params.clone())),
            })
            .await?;

        tracing::info!(
            action = name,
            action_id = %log.action_id,
            playbook_id = context.playbook_id.as_deref(),
            step_id = context.step_id.as_deref(),
            "Dispatching action"
        );

        let outcome = match self.handlers.get(name) {
            Some(handler) => handler.execute(params).await,
            None => Err(ActionError::UnknownAction(name.to_string())),
        };

        let execution_time_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
        let completion = match &outcome {
            Ok(result) => ActionCompletion {
                status: ActionStatus::Completed,
                result: Some(serde_json::Value::from(result)),
                error: None,
                execution_time_ms,
                completed_at: Utc::now(),
            },
            Err(e) => ActionCompletion {
                status: ActionStatus::Failed,
                result: None,
                error: Some(e.to_string()),
                execution_time_ms,
                completed_at: Utc::now(),
            },
        };

        match &outcome {
            Ok(_) => tracing::info!(action = name, action_id = %log.action_id, execution_time_ms, "Action completed"),
            Err(e) => tracing::warn!(action = name, action_id = %log.action_id, execution_time_ms, error = %e, "Action failed"),
        }

        if let Err(e) = self.store.finish_action(log.action_id, completion).await {
            tracing::error!(action_id = %log.action_id, error = %e, "Failed to finalize action log");
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::store::{ActionLogStore, EventStore, IncidentStore, Stats, WindowQuery};
    use crate::errors::StoreError;
    use crate::models::action_log::{ActionLog, ActionLogFilters};
    use crate::models::event::{Event, EventFilters, NewEvent};
    use crate::models::incident::{Incident, IncidentFilters, NewIncident, UpdateIncident};
    use chrono::DateTime;

    struct Echo;

    #[async_trait]
    impl ActionHandler for Echo {
        async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
            Ok(Value::Map(params.clone()))
        }
    }

    struct Broken;

    #[async_trait]
    impl ActionHandler for Broken {
        async fn execute(&self, _params: &Params) -> Result<Value, ActionError> {
            Err(ActionError::Process("exploded".to_string()))
        }
    }

    fn params(json: serde_json::Value) -> Params {
        match Value::from(json) {
            Value::Map(m) => m,
            _ => Params::new(),
        }
    }

    #[tokio::test]
    async fn unknown_action_is_logged_as_failed() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = ActionDispatcher::new(store.clone());

        let err = dispatcher
            .dispatch("teleport", &params(serde_json::json!({"to": "mars"})), &DispatchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::UnknownAction(ref n) if n == "teleport"));

        let logs = store.action_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action_type, "teleport");
        assert_eq!(logs[0].status, ActionStatus::Failed);
        assert_eq!(logs[0].error.as_deref(), Some("unknown action type: teleport"));
        assert_eq!(logs[0].parameters["to"], "mars");
        assert!(logs[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn successful_dispatch_records_result_and_context() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = ActionDispatcher::new(store.clone());
        dispatcher.register("echo", Echo);

        let result = dispatcher
            .dispatch(
                "echo",
                &params(serde_json::json!({"x": 1})),
                &DispatchContext::for_step("contain-host", "step-1"),
            )
            .await
            .unwrap();
        assert_eq!(result.get_path("x"), Some(&Value::Int(1)));

        let logs = store.action_logs().await;
        assert_eq!(logs[0].status, ActionStatus::Completed);
        assert_eq!(logs[0].result.as_ref().unwrap()["x"], 1);
        assert_eq!(logs[0].playbook_id.as_deref(), Some("contain-host"));
        assert_eq!(logs[0].step_id.as_deref(), Some("step-1"));
        assert!(logs[0].error.is_none());
    }

    #[tokio::test]
    async fn handler_error_is_returned_and_logged() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = ActionDispatcher::new(store.clone());
        dispatcher.register("broken", Broken);

        let err = dispatcher
            .dispatch("broken", &Params::new(), &DispatchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Process(_)));

        let logs = store.action_logs().await;
        assert_eq!(logs[0].status, ActionStatus::Failed);
        assert_eq!(logs[0].error.as_deref(), Some("process failed: exploded"));
    }

    #[tokio::test]
    async fn incident_id_param_is_attributed() {
        let store = Arc::new(MemoryStore::new());
        let mut dispatcher = ActionDispatcher::new(store.clone());
        dispatcher.register("echo", Echo);
        let id = Uuid::new_v4();

        dispatcher
            .dispatch(
                "echo",
                &params(serde_json::json!({"incident_id": id.to_string()})),
                &DispatchContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(store.action_logs().await[0].incident_id, Some(id));
    }

    #[test]
    fn defaults_register_every_builtin() {
        let dispatcher = ActionDispatcher::with_defaults(Arc::new(MemoryStore::new()));
        assert_eq!(
            dispatcher.action_names(),
            vec![
                "block_ip",
                "create_incident",
                "http_request",
                "log_action",
                "notify",
                "python_script",
                "shell_script",
                "update_incident",
                "webhook",
            ]
        );
    }

    /// Store whose action log is unavailable.
    struct NoLog(MemoryStore);

    #[async_trait]
    impl EventStore for NoLog {
        async fn insert_event(&self, event: NewEvent) -> Result<Event, StoreError> {
            self.0.insert_event(event).await
        }
        async fn get_event(&self, id: Uuid) -> Result<Option<Event>, StoreError> {
            self.0.get_event(id).await
        }
        async fn list_events(
            &self,
            filters: &EventFilters,
            limit: i64,
            offset: i64,
        ) -> Result<(Vec<Event>, i64), StoreError> {
            self.0.list_events(filters, limit, offset).await
        }
        async fn count_window(&self, query: &WindowQuery) -> Result<i64, StoreError> {
            self.0.count_window(query).await
        }
        async fn mark_processed(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
            self.0.mark_processed(id, at).await
        }
    }

    #[async_trait]
    impl IncidentStore for NoLog {
        async fn insert_incident(&self, incident: NewIncident) -> Result<Incident, StoreError> {
            self.0.insert_incident(incident).await
        }
        async fn get_incident(&self, id: Uuid) -> Result<Option<Incident>, StoreError> {
            self.0.get_incident(id).await
        }
        async fn list_incidents(
            &self,
            filters: &IncidentFilters,
            limit: i64,
            offset: i64,
        ) -> Result<(Vec<Incident>, i64), StoreError> {
            self.0.list_incidents(filters, limit, offset).await
        }
        async fn update_incident(
            &self,
            id: Uuid,
            update: &UpdateIncident,
        ) -> Result<Option<Incident>, StoreError> {
            self.0.update_incident(id, update).await
        }
    }

    #[async_trait]
    impl ActionLogStore for NoLog {
        async fn start_action(&self, _log: NewActionLog) -> Result<ActionLog, StoreError> {
            Err(StoreError::Database(sqlx::Error::PoolTimedOut))
        }
        async fn finish_action(
            &self,
            _id: Uuid,
            _completion: ActionCompletion,
        ) -> Result<(), StoreError> {
            Ok(())
        }
        async fn list_actions(
            &self,
            filters: &ActionLogFilters,
            limit: i64,
            offset: i64,
        ) -> Result<(Vec<ActionLog>, i64), StoreError> {
            self.0.list_actions(filters, limit, offset).await
        }
    }

    #[async_trait]
    impl Store for NoLog {
        async fn ping(&self) -> Result<(), StoreError> {
            Ok(())
        }
        async fn stats(&self) -> Result<Stats, StoreError> {
            self.0.stats().await
        }
    }

    #[tokio::test]
    async fn handler_does_not_run_without_a_log_row() {
        let store = Arc::new(NoLog(MemoryStore::new()));
        let mut dispatcher = ActionDispatcher::new(store.clone());
        dispatcher.register("create_incident", incident::CreateIncident::new(store.clone()));

        let err = dispatcher
            .dispatch("create_incident", &Params::new(), &DispatchContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::Store(_)));
        assert!(store.0.incidents().await.is_empty());
    }
}

//! Orchestration engine: runs playbook steps in order against an execution
//! context that later steps can reference through `{{ }}` templates.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::{ActionError, LoadError, PlaybookError};
use crate::models::playbook::{OnFailure, Playbook, PlaybookStep};
use crate::models::value::{Map, Value};
use crate::services::actions::{ActionDispatcher, DispatchContext};
use crate::services::loader::{self, LoadResult};
use crate::services::template;

type PlaybookSet = IndexMap<String, Arc<Playbook>>;

/// `{ inputs: {...}, steps: { <id>: { output, error } } }`
#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    root: Value,
}

impl ExecutionContext {
    pub fn new(inputs: Map) -> Self {
        Self {
            root: Value::map([
                ("inputs", Value::Map(inputs)),
                ("steps", Value::Map(Map::new())),
            ]),
        }
    }

    pub fn value(&self) -> &Value {
        &self.root
    }

    /// Record a step's result where later templates can see it.
    pub fn record(&mut self, step_id: &str, output: Value, error: Option<String>) {
        let entry = Value::map([
            ("output", output),
            ("error", error.map(Value::String).unwrap_or_default()),
        ]);
        if let Value::Map(root) = &mut self.root {
            match root.get_mut("steps") {
                Some(Value::Map(steps)) => {
                    steps.insert(step_id.to_string(), entry);
                }
                _ => {
                    root.insert("steps".to_string(), Value::map([(step_id, entry)]));
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub action: String,
    pub status: StepStatus,
    pub output: Value,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybookRun {
    pub run_id: Uuid,
    pub playbook_id: String,
    pub steps: Vec<StepOutcome>,
    pub context: ExecutionContext,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

pub struct Orchestrator {
    playbooks: RwLock<Arc<PlaybookSet>>,
    dispatcher: Arc<ActionDispatcher>,
}

impl Orchestrator {
    pub fn new(dispatcher: Arc<ActionDispatcher>) -> Self {
        Self {
            playbooks: RwLock::new(Arc::new(PlaybookSet::new())),
            dispatcher,
        }
    }

    /// Load playbooks from `dir` and merge them over the current set by id;
    /// the last definition of an id wins.
    pub async fn load_playbooks(&self, dir: &Path) -> Result<Vec<LoadResult>, LoadError> {
        let loaded = loader::load_dir::<Playbook>(dir)?;
        let count = loaded.definitions.len();
        self.publish(loaded.definitions.into_iter().map(|(_, p)| p))
            .await;
        tracing::info!(count, dir = %dir.display(), "Loaded playbooks");
        Ok(loaded.results)
    }

    pub async fn register_playbook(&self, playbook: Playbook) {
        self.publish(std::iter::once(playbook)).await;
    }

    async fn publish(&self, playbooks: impl Iterator<Item = Playbook>) {
        let mut guard = self.playbooks.write().await;
        let mut next = PlaybookSet::clone(&guard);
        for playbook in playbooks {
            next.insert(playbook.id.clone(), Arc::new(playbook));
        }
        *guard = Arc::new(next);
    }

    pub async fn playbook(&self, id: &str) -> Option<Arc<Playbook>> {
        self.playbooks.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<Arc<Playbook>> {
        self.playbooks.read().await.values().cloned().collect()
    }

    /// Run a playbook to completion.
    ///
    /// A failing step with `on_failure: abort` ends the run with
    /// [`PlaybookError::StepFailed`]; steps already run keep their action logs.
    pub async fn execute(&self, playbook_id: &str, inputs: Map) -> Result<PlaybookRun, PlaybookError> {
        let playbook = self
            .playbook(playbook_id)
            .await
            .ok_or_else(|| PlaybookError::NotFound(playbook_id.to_string()))?;

        if let Some(missing) = playbook.first_missing_input(&inputs) {
            return Err(PlaybookError::MissingInput(missing.to_string()));
        }

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut context = ExecutionContext::new(inputs);
        let mut steps = Vec::with_capacity(playbook.steps.len());

        tracing::info!(%run_id, playbook_id, steps = playbook.steps.len(), "Starting playbook run");

        for step in &playbook.steps {
            let (outcome, failure) = self.run_step(&playbook.id, step, &mut context).await;
            steps.push(outcome);

            if let Some(source) = failure {
                if step.on_failure == OnFailure::Abort {
                    tracing::warn!(%run_id, playbook_id, step_id = %step.id, error = %source, "Aborting playbook run");
                    return Err(PlaybookError::StepFailed {
                        step_id: step.id.clone(),
                        source,
                    });
                }
                tracing::warn!(%run_id, playbook_id, step_id = %step.id, error = %source, "Step failed, continuing");
            }
        }

        let completed_at = Utc::now();
        tracing::info!(%run_id, playbook_id, "Playbook run finished");

        Ok(PlaybookRun {
            run_id,
            playbook_id: playbook_id.to_string(),
            steps,
            context,
            started_at,
            completed_at,
        })
    }

    /// Run one step and record it in the context. Returns the dispatch error
    /// separately so the caller can apply the failure policy.
    async fn run_step(
        &self,
        playbook_id: &str,
        step: &PlaybookStep,
        context: &mut ExecutionContext,
    ) -> (StepOutcome, Option<ActionError>) {
        if let Some(condition) = &step.condition {
            if !template::is_truthy(condition, context.value()) {
                tracing::debug!(playbook_id, step_id = %step.id, "Step condition false, skipping");
                context.record(&step.id, Value::Null, None);
                let outcome = StepOutcome {
                    step_id: step.id.clone(),
                    action: step.action.clone(),
                    status: StepStatus::Skipped,
                    output: Value::Null,
                    error: None,
                };
                return (outcome, None);
            }
        }

        let params = template::interpolate(&step.parameters, context.value());
        let dispatch_context = DispatchContext::for_step(playbook_id, &step.id);
        let result = self
            .dispatcher
            .dispatch(&step.action, &params, &dispatch_context)
            .await;

        match result {
            Ok(output) => {
                context.record(&step.id, output.clone(), None);
                let outcome = StepOutcome {
                    step_id: step.id.clone(),
                    action: step.action.clone(),
                    status: StepStatus::Completed,
                    output,
                    error: None,
                };
                (outcome, None)
            }
            Err(e) => {
                let message = e.to_string();
                context.record(&step.id, Value::Null, Some(message.clone()));
                let outcome = StepOutcome {
                    step_id: step.id.clone(),
                    action: step.action.clone(),
                    status: StepStatus::Failed,
                    output: Value::Null,
                    error: Some(message),
                };
                (outcome, Some(e))
            }
        }
    }
}

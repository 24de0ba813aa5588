//! Detection engine: evaluates events against the published rule set and
//! fires rule actions on match.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::store::Store;
use crate::errors::{LoadError, StoreError};
use crate::models::event::Event;
use crate::models::rule::{Rule, RuleAction};
use crate::models::value::{Params, Value};
use crate::services::actions::{ActionDispatcher, DispatchContext};
use crate::services::condition::ConditionEvaluator;
use crate::services::loader::{self, LoadResult, LoadStatus};

/// Intent to run a playbook, recorded by an `execute_playbook` rule action.
#[derive(Debug, Clone, Serialize)]
pub struct PlaybookRequest {
    pub playbook_id: String,
    pub rule_id: String,
    pub event_id: Uuid,
    /// Incident created earlier by the same rule, if any.
    pub incident_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationOutcome {
    pub event_id: Uuid,
    pub matched_rules: Vec<String>,
    pub incidents: Vec<Uuid>,
    pub playbook_requests: Vec<PlaybookRequest>,
    pub processed_at: DateTime<Utc>,
}

pub struct DetectionEngine {
    rules: RwLock<Arc<Vec<Rule>>>,
    evaluator: ConditionEvaluator,
    dispatcher: Arc<ActionDispatcher>,
    store: Arc<dyn Store>,
}

impl DetectionEngine {
    pub fn new(store: Arc<dyn Store>, dispatcher: Arc<ActionDispatcher>) -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            evaluator: ConditionEvaluator::new(store.clone()),
            dispatcher,
            store,
        }
    }

    /// Load enabled rules from `dir` and publish them, replacing the current set.
    ///
    /// If the directory cannot be read the current set stays published.
    pub async fn load_rules(&self, dir: &Path) -> Result<Vec<LoadResult>, LoadError> {
        let loaded = loader::load_dir::<Rule>(dir)?;
        let mut results = loaded.results;
        let mut rules = Vec::with_capacity(loaded.definitions.len());

        for (path, rule) in loaded.definitions {
            if rule.enabled {
                rules.push(rule);
                continue;
            }
            tracing::debug!(rule_id = %rule.id, "Skipping disabled rule");
            if let Some(result) = results.iter_mut().find(|r| r.path == path) {
                result.status = LoadStatus::Skipped {
                    reason: "disabled".to_string(),
                };
            }
        }

        tracing::info!(count = rules.len(), dir = %dir.display(), "Loaded enabled rules");
        self.replace_rules(rules).await;
        Ok(results)
    }

    /// Publish a new rule set in one step.
    pub async fn replace_rules(&self, rules: Vec<Rule>) {
        *self.rules.write().await = Arc::new(rules);
    }

    /// Snapshot of the published rule set.
    pub async fn rules(&self) -> Arc<Vec<Rule>> {
        self.rules.read().await.clone()
    }

    /// Evaluate `event` against every rule in load order, run the actions of
    /// each matching rule, then stamp the event as processed.
    ///
    /// Action failures are logged and never stop later actions or rules.
    pub async fn evaluate(&self, event: &Event) -> Result<EvaluationOutcome, StoreError> {
        let rules = self.rules().await;
        let now = Utc::now();
        let normalized = event.normalized_value();

        tracing::debug!(event_id = %event.event_id, rules = rules.len(), "Evaluating event");

        let mut outcome = EvaluationOutcome {
            event_id: event.event_id,
            matched_rules: Vec::new(),
            incidents: Vec::new(),
            playbook_requests: Vec::new(),
            processed_at: now,
        };

        for rule in rules.iter() {
            if !self
                .evaluator
                .rule_matches(rule, event, &normalized, now)
                .await
            {
                continue;
            }
            tracing::info!(event_id = %event.event_id, rule_id = %rule.id, "Event matched rule");
            outcome.matched_rules.push(rule.id.clone());
            self.run_actions(rule, event, &mut outcome).await;
        }

        let processed_at = Utc::now();
        self.store.mark_processed(event.event_id, processed_at).await?;
        outcome.processed_at = processed_at;
        Ok(outcome)
    }

    async fn run_actions(&self, rule: &Rule, event: &Event, outcome: &mut EvaluationOutcome) {
        let mut rule_incident = None;

        for action in &rule.actions {
            match action {
                RuleAction::CreateIncident { .. } => {
                    let params = incident_params(rule, event);
                    match self
                        .dispatcher
                        .dispatch("create_incident", &params, &DispatchContext::default())
                        .await
                    {
                        Ok(result) => {
                            let id = result
                                .get_path("incident_id")
                                .and_then(Value::as_str)
                                .and_then(|id| Uuid::parse_str(id).ok());
                            if let Some(id) = id {
                                tracing::info!(incident_id = %id, rule_id = %rule.id, "Created incident for rule");
                                outcome.incidents.push(id);
                                rule_incident = Some(id);
                            }
                        }
                        Err(e) => {
                            tracing::error!(rule_id = %rule.id, error = %e, "Failed to create incident");
                        }
                    }
                }
                RuleAction::Notify { channel, message } => {
                    let message = message.clone().unwrap_or_else(|| {
                        format!("Rule '{}' triggered by event {}", rule.name, event.event_id)
                    });
                    let mut params = Params::new();
                    if let Some(channel) = channel {
                        params.insert("channel".into(), Value::from(channel.as_str()));
                    }
                    params.insert("message".into(), Value::from(message));
                    let context = DispatchContext {
                        incident_id: rule_incident,
                        ..Default::default()
                    };
                    if let Err(e) = self.dispatcher.dispatch("notify", &params, &context).await {
                        tracing::error!(rule_id = %rule.id, error = %e, "Failed to send notification");
                    }
                }
                RuleAction::ExecutePlaybook { playbook } => {
                    tracing::info!(
                        playbook_id = %playbook,
                        rule_id = %rule.id,
                        event_id = %event.event_id,
                        "Triggering playbook"
                    );
                    outcome.playbook_requests.push(PlaybookRequest {
                        playbook_id: playbook.clone(),
                        rule_id: rule.id.clone(),
                        event_id: event.event_id,
                        incident_id: rule_incident,
                    });
                }
                RuleAction::Unsupported { kind, reason } => {
                    tracing::warn!(rule_id = %rule.id, action_type = %kind, reason = %reason, "Skipping unsupported rule action");
                }
            }
        }
    }
}

fn incident_params(rule: &Rule, event: &Event) -> Params {
    let mut params = Params::new();
    params.insert("severity".into(), Value::from(rule.severity.as_str()));
    params.insert("category".into(), Value::from(rule.category.as_str()));
    params.insert("title".into(), Value::from(rule.name.as_str()));
    params.insert(
        "description".into(),
        Value::from(format!(
            "{}\nTriggered by event: {}",
            rule.description, event.event_id
        )),
    );
    params.insert("triggered_by_rule".into(), Value::from(rule.id.as_str()));
    params.insert(
        "related_events".into(),
        Value::List(vec![Value::from(event.event_id.to_string())]),
    );
    params
}

//! Bounded detection queue decoupling ingestion from rule evaluation.
//!
//! Persisted events are pushed onto an mpsc channel; a consumer task spawns
//! one evaluation per event, at most `workers` at a time. When playbook
//! hand-off is enabled, `execute_playbook` intents from each outcome are run
//! on the orchestrator under a separate limit; an evaluation task waits for a
//! playbook permit before spawning the run, so a burst of matches slows the
//! queue down instead of piling up parked runs.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::errors::QueueClosed;
use crate::models::event::Event;
use crate::models::value::{Map, Value};
use crate::services::detection::{DetectionEngine, EvaluationOutcome, PlaybookRequest};
use crate::services::orchestrator::Orchestrator;

#[derive(Debug, Clone)]
pub struct QueueOptions {
    pub capacity: usize,
    pub workers: usize,
    pub playbook_workers: usize,
    pub auto_execute_playbooks: bool,
}

#[derive(Clone)]
pub struct DetectionQueue {
    sender: mpsc::Sender<Event>,
}

impl DetectionQueue {
    /// Start the consumer task and return the producer handle.
    pub fn spawn(
        detection: Arc<DetectionEngine>,
        orchestrator: Arc<Orchestrator>,
        options: QueueOptions,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(options.capacity.max(1));
        let workers = Arc::new(Semaphore::new(options.workers.max(1)));
        let handoff = options.auto_execute_playbooks.then(|| PlaybookHandoff {
            orchestrator,
            permits: Arc::new(Semaphore::new(options.playbook_workers.max(1))),
        });

        let handle = tokio::spawn(consume(receiver, detection, workers, handoff));
        (Self { sender }, handle)
    }

    /// Enqueue an event, waiting for space when the queue is full.
    pub async fn submit(&self, event: Event) -> Result<(), QueueClosed> {
        self.sender.send(event).await.map_err(|_| QueueClosed)
    }
}

async fn consume(
    mut receiver: mpsc::Receiver<Event>,
    detection: Arc<DetectionEngine>,
    workers: Arc<Semaphore>,
    handoff: Option<PlaybookHandoff>,
) {
    while let Some(event) = receiver.recv().await {
        let Ok(permit) = workers.clone().acquire_owned().await else {
            break;
        };
        let detection = detection.clone();
        let handoff = handoff.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match detection.evaluate(&event).await {
                Ok(outcome) => {
                    if let Some(handoff) = handoff {
                        handoff.run(&event, &outcome).await;
                    }
                }
                Err(e) => {
                    tracing::error!(event_id = %event.event_id, error = %e, "Event evaluation failed");
                }
            }
        });
    }
    tracing::info!("Detection queue closed");
}

#[derive(Clone)]
struct PlaybookHandoff {
    orchestrator: Arc<Orchestrator>,
    permits: Arc<Semaphore>,
}

impl PlaybookHandoff {
    async fn run(&self, event: &Event, outcome: &EvaluationOutcome) {
        for request in &outcome.playbook_requests {
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                return;
            };
            let inputs = playbook_inputs(event, request);
            let playbook_id = request.playbook_id.clone();
            let orchestrator = self.orchestrator.clone();
            tokio::spawn(async move {
                let _permit = permit;
                match orchestrator.execute(&playbook_id, inputs).await {
                    Ok(run) => {
                        tracing::info!(playbook_id = %playbook_id, run_id = %run.run_id, "Rule-triggered playbook finished");
                    }
                    Err(e) => {
                        tracing::error!(playbook_id = %playbook_id, error = %e, "Rule-triggered playbook failed");
                    }
                }
            });
        }
    }
}

/// Inputs handed to a rule-triggered playbook.
pub fn playbook_inputs(event: &Event, request: &PlaybookRequest) -> Map {
    let mut inputs = Map::new();
    inputs.insert("event_id".into(), Value::from(event.event_id.to_string()));
    inputs.insert("rule_id".into(), Value::from(request.rule_id.as_str()));
    inputs.insert("event_type".into(), Value::from(event.event_type.as_str()));
    inputs.insert("source".into(), Value::from(event.source.as_str()));
    inputs.insert("severity".into(), Value::from(event.severity.as_str()));
    if let Some(incident_id) = request.incident_id {
        inputs.insert("incident_id".into(), Value::from(incident_id.to_string()));
    }
    inputs.insert("event".into(), event.normalized_value());
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::errors::ActionError;
    use crate::models::value::Params;
    use crate::services::actions::ActionHandler;

    use crate::db::memory::MemoryStore;
    use crate::db::store::EventStore;
    use crate::models::event::{NewEvent, SeverityLevel};
    use crate::models::playbook::PlaybookDocument;
    use crate::models::rule::RuleDocument;
    use crate::services::actions::ActionDispatcher;
    use chrono::Utc;
    use uuid::Uuid;

    fn setup(auto_execute: bool) -> (Arc<MemoryStore>, Arc<DetectionEngine>, Arc<Orchestrator>, DetectionQueue) {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(ActionDispatcher::with_defaults(store.clone()));
        let detection = Arc::new(DetectionEngine::new(store.clone(), dispatcher.clone()));
        let orchestrator = Arc::new(Orchestrator::new(dispatcher));
        let (queue, _handle) = DetectionQueue::spawn(
            detection.clone(),
            orchestrator.clone(),
            QueueOptions {
                capacity: 8,
                workers: 2,
                playbook_workers: 1,
                auto_execute_playbooks: auto_execute,
            },
        );
        (store, detection, orchestrator, queue)
    }

    async fn persisted_event(store: &MemoryStore) -> Event {
        store
            .insert_event(NewEvent {
                event_id: Uuid::new_v4(),
                timestamp: Utc::now(),
                source: "edr".to_string(),
                event_type: "malware_detected".to_string(),
                severity: SeverityLevel::Critical,
                raw_data: None,
                normalized: serde_json::json!({"host": "ws-12"}),
            })
            .await
            .unwrap()
    }

    async fn wait_for<F, Fut>(mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..100 {
            if check().await {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    const RULE: &str = "rule:\n  id: malware\n  name: Malware\n  severity: critical\n  enabled: true\n  actions:\n    - type: create_incident\n    - type: execute_playbook\n      playbook: isolate\n";

    const PLAYBOOK: &str = r#"
playbook:
  id: isolate
  name: Isolate
  inputs:
    - name: incident_id
      required: true
  steps:
    - id: announce
      action: notify
      parameters:
        channel: soc
        message: "isolating {{ inputs.event.host }} for {{ inputs.rule_id }}"
"#;

    #[tokio::test]
    async fn submitted_events_are_evaluated() {
        let (store, detection, _, queue) = setup(false);
        detection
            .replace_rules(vec![serde_yaml::from_str::<RuleDocument>(RULE).unwrap().rule])
            .await;

        let event = persisted_event(&store).await;
        let id = event.event_id;
        queue.submit(event).await.unwrap();

        let processed = wait_for(|| {
            let store = store.clone();
            async move {
                store
                    .get_event(id)
                    .await
                    .ok()
                    .flatten()
                    .is_some_and(|e| e.processed_at.is_some())
            }
        })
        .await;
        assert!(processed);
        assert_eq!(store.incidents().await.len(), 1);
        // Hand-off disabled: only the incident action ran.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.action_logs().await.len(), 1);
    }

    #[tokio::test]
    async fn playbook_requests_run_when_enabled() {
        let (store, detection, orchestrator, queue) = setup(true);
        detection
            .replace_rules(vec![serde_yaml::from_str::<RuleDocument>(RULE).unwrap().rule])
            .await;
        orchestrator
            .register_playbook(serde_yaml::from_str::<PlaybookDocument>(PLAYBOOK).unwrap().playbook)
            .await;

        queue.submit(persisted_event(&store).await).await.unwrap();

        let notified = wait_for(|| {
            let store = store.clone();
            async move {
                store.action_logs().await.iter().any(|log| {
                    log.action_type == "notify"
                        && log.playbook_id.as_deref() == Some("isolate")
                        && log.parameters["message"] == "isolating ws-12 for malware"
                })
            }
        })
        .await;
        assert!(notified);
    }

    /// Blocks until `release` has permits, counting how many calls started.
    struct Hold {
        started: Arc<AtomicUsize>,
        release: Arc<Semaphore>,
    }

    #[async_trait]
    impl ActionHandler for Hold {
        async fn execute(&self, _params: &Params) -> Result<Value, ActionError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            let _ = self.release.acquire().await;
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn handoff_waits_for_a_free_playbook_permit() {
        let store = Arc::new(MemoryStore::new());
        let started = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Semaphore::new(0));
        let mut dispatcher = ActionDispatcher::new(store.clone());
        dispatcher.register(
            "hold",
            Hold {
                started: started.clone(),
                release: release.clone(),
            },
        );
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(dispatcher)));
        orchestrator
            .register_playbook(
                serde_yaml::from_str::<PlaybookDocument>(
                    "playbook:\n  id: slow\n  name: Slow\n  steps:\n    - id: wait\n      action: hold\n",
                )
                .unwrap()
                .playbook,
            )
            .await;

        let handoff = PlaybookHandoff {
            orchestrator,
            permits: Arc::new(Semaphore::new(1)),
        };
        let event = persisted_event(&store).await;
        let request = PlaybookRequest {
            playbook_id: "slow".to_string(),
            rule_id: "malware".to_string(),
            event_id: event.event_id,
            incident_id: None,
        };
        let outcome = EvaluationOutcome {
            event_id: event.event_id,
            matched_rules: vec!["malware".to_string()],
            incidents: vec![],
            playbook_requests: vec![request.clone(), request.clone(), request],
            processed_at: Utc::now(),
        };

        // One run holds the only permit; the second request cannot be spawned.
        let blocked =
            tokio::time::timeout(Duration::from_millis(100), handoff.run(&event, &outcome)).await;
        assert!(blocked.is_err());
        assert_eq!(started.load(Ordering::SeqCst), 1);
        assert_eq!(handoff.permits.available_permits(), 0);

        release.add_permits(16);
        handoff.run(&event, &outcome).await;
        let finished = wait_for(|| {
            let started = started.clone();
            let permits = handoff.permits.clone();
            async move { started.load(Ordering::SeqCst) == 4 && permits.available_permits() == 1 }
        })
        .await;
        assert!(finished);
    }

    #[test]
    fn inputs_carry_event_and_incident() {
        let event = Event {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: "edr".to_string(),
            event_type: "malware_detected".to_string(),
            severity: SeverityLevel::High,
            raw_data: None,
            normalized: serde_json::json!({"host": "ws-12"}),
            created_at: Utc::now(),
            processed_at: None,
        };
        let request = PlaybookRequest {
            playbook_id: "isolate".to_string(),
            rule_id: "malware".to_string(),
            event_id: event.event_id,
            incident_id: None,
        };
        let inputs = playbook_inputs(&event, &request);
        assert!(!inputs.contains_key("incident_id"));
        assert_eq!(inputs["severity"], Value::from("high"));
        assert_eq!(
            inputs["event"].get_path("host"),
            Some(&Value::from("ws-12"))
        );
    }
}

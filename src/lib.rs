pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod routes;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::AppConfig;
use crate::db::store::Store;
use crate::services::actions::ActionDispatcher;
use crate::services::detection::DetectionEngine;
use crate::services::orchestrator::Orchestrator;
use crate::services::queue::{DetectionQueue, QueueOptions};

/// Shared application state passed to all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub detection: Arc<DetectionEngine>,
    pub orchestrator: Arc<Orchestrator>,
    pub queue: DetectionQueue,
    pub config: AppConfig,
}

impl AppState {
    /// Wire the engines around `store` and start the detection queue.
    ///
    /// The returned handle is the queue consumer; it finishes once every
    /// clone of the state has been dropped.
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> (Self, JoinHandle<()>) {
        let dispatcher = Arc::new(ActionDispatcher::with_defaults(store.clone()));
        let detection = Arc::new(DetectionEngine::new(store.clone(), dispatcher.clone()));
        let orchestrator = Arc::new(Orchestrator::new(dispatcher));

        let (queue, consumer) = DetectionQueue::spawn(
            detection.clone(),
            orchestrator.clone(),
            QueueOptions {
                capacity: config.detection_queue_capacity,
                workers: config.detection_workers,
                playbook_workers: config.playbook_workers,
                auto_execute_playbooks: config.auto_execute_playbooks,
            },
        );

        let state = Self {
            store,
            detection,
            orchestrator,
            queue,
            config,
        };
        (state, consumer)
    }

    /// Load rules and playbooks from the configured directories.
    ///
    /// A missing directory is logged and leaves that set empty; the server
    /// still starts.
    pub async fn load_definitions(&self) {
        match self
            .detection
            .load_rules(Path::new(&self.config.rules_dir))
            .await
        {
            Ok(results) => {
                tracing::info!(dir = %self.config.rules_dir, files = results.len(), "Rules loaded");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Rules not loaded");
            }
        }

        match self
            .orchestrator
            .load_playbooks(Path::new(&self.config.playbooks_dir))
            .await
        {
            Ok(results) => {
                tracing::info!(dir = %self.config.playbooks_dir, files = results.len(), "Playbooks loaded");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Playbooks not loaded");
            }
        }
    }
}

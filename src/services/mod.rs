//! Detection, orchestration and action services.

pub mod actions;
pub mod condition;
pub mod detection;
pub mod event;
pub mod incident;
pub mod loader;
pub mod orchestrator;
pub mod queue;
pub mod template;

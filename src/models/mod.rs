//! Domain models, definition-file shapes, and DTOs.

pub mod action_log;
pub mod event;
pub mod incident;
pub mod pagination;
pub mod playbook;
pub mod rule;
pub mod value;

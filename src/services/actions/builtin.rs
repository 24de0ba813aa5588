//! Stateless built-in actions: notifications, simulated IP blocks, log lines.

use std::net::IpAddr;

use async_trait::async_trait;

use super::params::{required_parsed, secs_or, string_or};
use super::ActionHandler;
use crate::errors::ActionError;
use crate::models::value::{Params, Value};

/// Emit a notification on the log stream.
pub struct Notify;

#[async_trait]
impl ActionHandler for Notify {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
        let channel = string_or(params, "channel", "console");
        let message = string_or(params, "message", "Notification");

        tracing::info!(channel = %channel, message = %message, "Notification");

        Ok(Value::map([
            ("channel", Value::from(channel)),
            ("message", Value::from(message)),
            ("status", Value::from("sent")),
        ]))
    }
}

/// Simulated firewall block. Validates the address but changes nothing.
pub struct BlockIp;

impl BlockIp {
    const DEFAULT_DURATION_SECS: u64 = 3600;
}

#[async_trait]
impl ActionHandler for BlockIp {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
        let ip: IpAddr = required_parsed(params, "ip_address")?;
        let duration = secs_or(params, "duration", Self::DEFAULT_DURATION_SECS);

        tracing::info!(ip_address = %ip, duration, "Simulating IP block");

        Ok(Value::map([
            ("ip_address", Value::from(ip.to_string())),
            ("duration", Value::Int(i64::try_from(duration).unwrap_or(i64::MAX))),
            ("action", Value::from("blocked")),
            ("simulated", Value::Bool(true)),
        ]))
    }
}

/// Write a message to the log at the requested level.
pub struct LogAction;

#[async_trait]
impl ActionHandler for LogAction {
    async fn execute(&self, params: &Params) -> Result<Value, ActionError> {
        let message = string_or(params, "message", "");
        let level = string_or(params, "level", "info").to_ascii_lowercase();

        match level.as_str() {
            "debug" => tracing::debug!(message = %message, "Playbook log"),
            "warn" | "warning" => tracing::warn!(message = %message, "Playbook log"),
            "error" => tracing::error!(message = %message, "Playbook log"),
            _ => tracing::info!(message = %message, "Playbook log"),
        }

        Ok(Value::map([
            ("logged", Value::Bool(true)),
            ("level", Value::from(level)),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(json: serde_json::Value) -> Params {
        match Value::from(json) {
            Value::Map(m) => m,
            _ => Params::new(),
        }
    }

    #[tokio::test]
    async fn notify_defaults_to_console() {
        let out = Notify
            .execute(&params(serde_json::json!({"message": "disk full"})))
            .await
            .unwrap();
        assert_eq!(out.get_path("channel"), Some(&Value::from("console")));
        assert_eq!(out.get_path("message"), Some(&Value::from("disk full")));
        assert_eq!(out.get_path("status"), Some(&Value::from("sent")));
    }

    #[tokio::test]
    async fn block_ip_requires_a_valid_address() {
        let err = BlockIp.execute(&Params::new()).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));

        let err = BlockIp
            .execute(&params(serde_json::json!({"ip_address": "not-an-ip"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::InvalidParams(_)));
    }

    #[tokio::test]
    async fn block_ip_is_simulated() {
        let out = BlockIp
            .execute(&params(serde_json::json!({"ip_address": "203.0.113.7", "duration": 600})))
            .await
            .unwrap();
        assert_eq!(out.get_path("ip_address"), Some(&Value::from("203.0.113.7")));
        assert_eq!(out.get_path("duration"), Some(&Value::Int(600)));
        assert_eq!(out.get_path("simulated"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn log_action_reports_level() {
        let out = LogAction
            .execute(&params(serde_json::json!({"message": "hi", "level": "WARN"})))
            .await
            .unwrap();
        assert_eq!(out.get_path("level"), Some(&Value::from("warn")));
    }
}

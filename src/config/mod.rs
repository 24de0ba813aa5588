use std::env;
use std::str::FromStr;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string, or `memory` for the in-process store.
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub rules_dir: String,
    pub playbooks_dir: String,
    /// Upper bound on concurrently evaluating events.
    pub detection_workers: usize,
    pub detection_queue_capacity: usize,
    /// Upper bound on concurrently running rule-triggered playbooks.
    pub playbook_workers: usize,
    pub auto_execute_playbooks: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, env::VarError> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10),
            host: env::var("BACKEND_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("BACKEND_PORT", 8000),
            rules_dir: env::var("RULES_DIR").unwrap_or_else(|_| "./data/rules".to_string()),
            playbooks_dir: env::var("PLAYBOOKS_DIR")
                .unwrap_or_else(|_| "./data/playbooks".to_string()),
            detection_workers: parse_or("DETECTION_WORKERS", 8).max(1),
            detection_queue_capacity: parse_or("DETECTION_QUEUE_CAPACITY", 1024).max(1),
            playbook_workers: parse_or("PLAYBOOK_WORKERS", 4).max(1),
            auto_execute_playbooks: flag_or("AUTO_EXECUTE_PLAYBOOKS", false),
        })
    }

    /// Whether the in-memory store was requested instead of Postgres.
    pub fn uses_memory_store(&self) -> bool {
        self.database_url.eq_ignore_ascii_case("memory")
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn flag_or(key: &str, default: bool) -> bool {
    let raw = match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw,
        _ => return default,
    };
    parse_flag(&raw).unwrap_or_else(|| {
        tracing::warn!(key, value = %raw, default, "Unrecognised boolean setting, using default");
        default
    })
}

//! Rule condition evaluation against a single event.
//!
//! Evaluation is total: malformed conditions, absent fields, type
//! mismatches and storage failures all resolve to `false`.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::db::store::{CountKey, Store, WindowQuery};
use crate::models::event::{Event, EventColumn};
use crate::models::rule::{Condition, ConditionKind, Rule, Window};
use crate::models::value::Value;

/// Resolve a condition field: well-known event columns by exact name, else a
/// dotted path into the normalized payload.
pub fn resolve_field(event: &Event, normalized: &Value, field: &str) -> Option<Value> {
    match EventColumn::parse(field) {
        Some(column) => Some(Value::from(column.read(event))),
        None => normalized.get_path(field).cloned(),
    }
}

/// Non-aggregate operators. Window operators and invalid conditions are `false` here.
pub fn matches_value(kind: &ConditionKind, actual: Option<&Value>) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match kind {
        ConditionKind::Equals { value } => actual.to_string() == value.to_string(),
        ConditionKind::In { values } => {
            let actual = actual.to_string();
            values.iter().any(|v| *v == actual)
        }
        ConditionKind::GreaterThan { value } => match (actual, value) {
            (Value::Float(a), Value::Float(b)) => a > b,
            _ => false,
        },
        ConditionKind::Regex { pattern } => pattern.is_match(&actual.to_string()),
        ConditionKind::Count { .. }
        | ConditionKind::CountDistinct { .. }
        | ConditionKind::Invalid { .. } => false,
    }
}

#[derive(Clone)]
pub struct ConditionEvaluator {
    store: Arc<dyn Store>,
}

impl ConditionEvaluator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Evaluate one condition. `now` bounds the trailing window of the
    /// aggregate operators.
    pub async fn evaluate(
        &self,
        event: &Event,
        normalized: &Value,
        condition: &Condition,
        now: DateTime<Utc>,
    ) -> bool {
        match &condition.kind {
            ConditionKind::Count { window } => self.window_matches(event, window, None, now).await,
            ConditionKind::CountDistinct {
                window,
                count_field,
            } => {
                let key = CountKey::parse(count_field);
                self.window_matches(event, window, Some(key), now).await
            }
            ConditionKind::Invalid { operator, reason } => {
                tracing::warn!(
                    field = %condition.field,
                    operator = %operator,
                    reason = %reason,
                    "Skipping malformed condition"
                );
                false
            }
            kind => {
                let actual = resolve_field(event, normalized, &condition.field);
                matches_value(kind, actual.as_ref())
            }
        }
    }

    /// AND over all conditions, short-circuiting. An empty list matches.
    pub async fn rule_matches(
        &self,
        rule: &Rule,
        event: &Event,
        normalized: &Value,
        now: DateTime<Utc>,
    ) -> bool {
        for condition in &rule.conditions {
            if !self.evaluate(event, normalized, condition, now).await {
                return false;
            }
        }
        true
    }

    /// Count events in `[now - time_window, now]` whose `window.column`
    /// equals the current event's `event_type`.
    async fn window_matches(
        &self,
        event: &Event,
        window: &Window,
        distinct: Option<CountKey>,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(since) = TimeDelta::try_seconds(window.time_window_secs)
            .and_then(|span| now.checked_sub_signed(span))
        else {
            tracing::warn!(
                time_window = window.time_window_secs,
                "Time window out of range"
            );
            return false;
        };

        let query = WindowQuery {
            column: window.column,
            value: event.event_type.clone(),
            since,
            until: now,
            distinct,
        };

        match self.store.count_window(&query).await {
            Ok(count) => {
                tracing::debug!(
                    event_id = %event.event_id,
                    column = window.column.as_str(),
                    count,
                    threshold = window.threshold,
                    "Window count"
                );
                count >= window.threshold
            }
            Err(e) => {
                tracing::warn!(error = %e, event_id = %event.event_id, "Window count failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::db::store::EventStore;
    use crate::models::event::{NewEvent, SeverityLevel};
    use chrono::Duration;
    use uuid::Uuid;

    fn condition(yaml: &str) -> Condition {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn new_event(event_type: &str, at: DateTime<Utc>, normalized: serde_json::Value) -> NewEvent {
        NewEvent {
            event_id: Uuid::new_v4(),
            timestamp: at,
            source: "auth-gateway".to_string(),
            event_type: event_type.to_string(),
            severity: SeverityLevel::Medium,
            raw_data: None,
            normalized,
        }
    }

    fn event(normalized: serde_json::Value) -> Event {
        let new = new_event("authentication_failed", Utc::now(), normalized);
        Event {
            event_id: new.event_id,
            timestamp: new.timestamp,
            source: new.source,
            event_type: new.event_type,
            severity: new.severity,
            raw_data: None,
            normalized: new.normalized,
            created_at: new.timestamp,
            processed_at: None,
        }
    }

    fn evaluator() -> (Arc<MemoryStore>, ConditionEvaluator) {
        let store = Arc::new(MemoryStore::new());
        let evaluator = ConditionEvaluator::new(store.clone());
        (store, evaluator)
    }

    async fn check(yaml: &str, normalized: serde_json::Value) -> bool {
        let (_, evaluator) = evaluator();
        let event = event(normalized);
        let payload = event.normalized_value();
        evaluator
            .evaluate(&event, &payload, &condition(yaml), Utc::now())
            .await
    }

    #[tokio::test]
    async fn equals_is_case_sensitive_string_comparison() {
        let yaml = "field: event_type\noperator: equals\nvalue: authentication_failed\n";
        assert!(check(yaml, serde_json::json!({})).await);

        let yaml = "field: event_type\noperator: equals\nvalue: Authentication_Failed\n";
        assert!(!check(yaml, serde_json::json!({})).await);

        let yaml = "field: dst.port\noperator: equals\nvalue: '22'\n";
        assert!(check(yaml, serde_json::json!({"dst": {"port": 22}})).await);
    }

    #[tokio::test]
    async fn absent_field_never_matches() {
        let yaml = "field: user\noperator: equals\nvalue: 'null'\n";
        assert!(!check(yaml, serde_json::json!({})).await);

        let yaml = "field: user\noperator: regex\npattern: '.*'\n";
        assert!(!check(yaml, serde_json::json!({})).await);
    }

    #[tokio::test]
    async fn in_matches_any_listed_value() {
        let yaml = "field: severity\noperator: in\nvalues: [high, medium]\n";
        assert!(check(yaml, serde_json::json!({})).await);

        let yaml = "field: port\noperator: in\nvalues: [22, 3389]\n";
        assert!(check(yaml, serde_json::json!({"port": 3389})).await);
        assert!(!check(yaml, serde_json::json!({"port": 80})).await);
    }

    #[tokio::test]
    async fn greater_than_requires_floats_on_both_sides() {
        let yaml = "field: bytes\noperator: greater_than\nvalue: 100.0\n";
        assert!(check(yaml, serde_json::json!({"bytes": 150.5})).await);
        assert!(!check(yaml, serde_json::json!({"bytes": 50.0})).await);
        // Integer payload values do not coerce.
        assert!(!check(yaml, serde_json::json!({"bytes": 150})).await);

        let yaml = "field: bytes\noperator: greater_than\nvalue: 100\n";
        assert!(!check(yaml, serde_json::json!({"bytes": 150.5})).await);
    }

    #[tokio::test]
    async fn regex_matches_default_string_form() {
        let yaml = "field: user.name\noperator: regex\npattern: '^adm'\n";
        assert!(check(yaml, serde_json::json!({"user": {"name": "admin"}})).await);
        assert!(!check(yaml, serde_json::json!({"user": {"name": "root"}})).await);
    }

    #[tokio::test]
    async fn invalid_conditions_evaluate_false() {
        let yaml = "field: user\noperator: regex\npattern: '(['\n";
        assert!(!check(yaml, serde_json::json!({"user": "(["})).await);

        let yaml = "field: user\noperator: startswith\nvalue: a\n";
        assert!(!check(yaml, serde_json::json!({"user": "abc"})).await);
    }

    #[tokio::test]
    async fn count_uses_trailing_window_ending_at_now() {
        let (store, evaluator) = evaluator();
        let now = Utc::now();
        for secs in [10, 60, 120, 240] {
            store
                .insert_event(new_event("authentication_failed", now - Duration::seconds(secs), serde_json::json!({})))
                .await
                .unwrap();
        }
        // Outside the window.
        store
            .insert_event(new_event("authentication_failed", now - Duration::seconds(900), serde_json::json!({})))
            .await
            .unwrap();

        let current = store
            .insert_event(new_event("authentication_failed", now, serde_json::json!({})))
            .await
            .unwrap();
        let payload = current.normalized_value();
        let rule = condition("field: event_type\noperator: count\nthreshold: 5\ntime_window: 300\n");
        assert!(evaluator.evaluate(&current, &payload, &rule, now).await);

        let stricter = condition("field: event_type\noperator: count\nthreshold: 6\ntime_window: 300\n");
        assert!(!evaluator.evaluate(&current, &payload, &stricter, now).await);
    }

    #[tokio::test]
    async fn events_after_now_do_not_count() {
        let (store, evaluator) = evaluator();
        let now = Utc::now();
        let current = store
            .insert_event(new_event("authentication_failed", now, serde_json::json!({})))
            .await
            .unwrap();
        store
            .insert_event(new_event("authentication_failed", now + Duration::seconds(1), serde_json::json!({})))
            .await
            .unwrap();
        let payload = current.normalized_value();
        let rule = condition("field: event_type\noperator: count\nthreshold: 2\ntime_window: 300\n");
        assert!(!evaluator.evaluate(&current, &payload, &rule, now).await);
    }

    #[tokio::test]
    async fn count_distinct_counts_payload_values() {
        let (store, evaluator) = evaluator();
        let now = Utc::now();
        for user in ["alice", "bob", "carol", "bob"] {
            store
                .insert_event(new_event("authentication_failed", now, serde_json::json!({"user": user})))
                .await
                .unwrap();
        }
        let current = store
            .insert_event(new_event("authentication_failed", now, serde_json::json!({"user": "alice"})))
            .await
            .unwrap();
        let payload = current.normalized_value();

        let three = condition("field: event_type\noperator: count_distinct\nthreshold: 3\ntime_window: 60\ncount_field: user\n");
        assert!(evaluator.evaluate(&current, &payload, &three, now).await);

        let four = condition("field: event_type\noperator: count_distinct\nthreshold: 4\ntime_window: 60\ncount_field: user\n");
        assert!(!evaluator.evaluate(&current, &payload, &four, now).await);
    }

    #[tokio::test]
    async fn empty_rule_matches_vacuously() {
        let (_, evaluator) = evaluator();
        let rule: Rule = serde_yaml::from_str("id: any\nname: Any\nenabled: true\n").unwrap();
        let event = event(serde_json::json!({}));
        let payload = event.normalized_value();
        assert!(evaluator.rule_matches(&rule, &event, &payload, Utc::now()).await);
    }
}

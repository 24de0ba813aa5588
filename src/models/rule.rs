//! Detection rule definitions as loaded from YAML.
//!
//! Conditions and rule actions are parsed leniently: a condition with missing
//! or mistyped parameters becomes [`ConditionKind::Invalid`] and a rule action
//! with an unknown or incomplete type becomes [`RuleAction::Unsupported`].
//! Neither makes the surrounding file unparseable.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::models::event::{EventColumn, SeverityLevel};
use crate::models::value::Value;

/// Top-level shape of a rule file: `rule: {...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDocument {
    pub rule: Rule,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default = "default_rule_severity", deserialize_with = "lenient_severity")]
    pub severity: SeverityLevel,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub actions: Vec<RuleAction>,
}

impl Rule {
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("rule id must not be empty".to_string());
        }
        Ok(())
    }
}

fn default_rule_severity() -> SeverityLevel {
    SeverityLevel::Medium
}

/// Unrecognised severities fall back to `medium`.
fn lenient_severity<'de, D>(deserializer: D) -> Result<SeverityLevel, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(SeverityLevel::parse)
        .unwrap_or_else(default_rule_severity))
}

// -- Conditions --

/// A single predicate over an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawCondition", into = "RawCondition")]
pub struct Condition {
    pub field: String,
    pub kind: ConditionKind,
}

/// Time-windowed aggregate parameters shared by `count` and `count_distinct`.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Event column filtered against the current event's `event_type`.
    pub column: EventColumn,
    pub threshold: i64,
    pub time_window_secs: i64,
}

#[derive(Debug, Clone)]
pub enum ConditionKind {
    Equals { value: Value },
    In { values: Vec<String> },
    GreaterThan { value: Value },
    Regex { pattern: Regex },
    Count { window: Window },
    CountDistinct { window: Window, count_field: String },
    /// Malformed condition; always evaluates to `false`.
    Invalid { operator: String, reason: String },
}

impl ConditionKind {
    pub fn operator(&self) -> &str {
        match self {
            Self::Equals { .. } => "equals",
            Self::In { .. } => "in",
            Self::GreaterThan { .. } => "greater_than",
            Self::Regex { .. } => "regex",
            Self::Count { .. } => "count",
            Self::CountDistinct { .. } => "count_distinct",
            Self::Invalid { operator, .. } => operator,
        }
    }
}

/// Wire shape of a condition: every key optional and loosely typed, so a
/// mistyped key lands in [`ConditionKind::Invalid`] instead of failing the file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawCondition {
    #[serde(default)]
    field: Option<Value>,
    #[serde(default)]
    operator: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    values: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pattern: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    threshold: Option<Value>,
    #[serde(default, alias = "timewindow", skip_serializing_if = "Option::is_none")]
    time_window: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count_field: Option<Value>,
}

/// String form of an optional scalar key. `Ok(None)` when absent or null.
fn optional_text(value: Option<&Value>) -> Result<Option<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(v) if v.is_scalar() => Ok(Some(v.to_string())),
        Some(v) => Err(format!("expected a scalar, got {v}")),
    }
}

impl From<RawCondition> for Condition {
    fn from(raw: RawCondition) -> Self {
        let field = optional_text(raw.field.as_ref());
        let operator = optional_text(raw.operator.as_ref());

        let kind = match (&field, &operator) {
            (Err(e), _) => Err(format!("`field` {e}")),
            (_, Err(e)) => Err(format!("`operator` {e}")),
            (Ok(field), Ok(operator)) => build_kind(
                &raw,
                field.as_deref().unwrap_or_default(),
                operator.as_deref().unwrap_or_default(),
            ),
        };
        let kind = kind.unwrap_or_else(|reason| ConditionKind::Invalid {
            operator: match &operator {
                Ok(op) => op.clone().unwrap_or_default(),
                Err(_) => raw.operator.as_ref().map(Value::to_string).unwrap_or_default(),
            },
            reason,
        });

        Self {
            field: field.ok().flatten().unwrap_or_default(),
            kind,
        }
    }
}

fn build_kind(raw: &RawCondition, field: &str, operator: &str) -> Result<ConditionKind, String> {
    match operator {
        "equals" => Ok(ConditionKind::Equals {
            value: raw.value.clone().ok_or("equals requires `value`")?,
        }),
        "in" => {
            let list = raw
                .values
                .as_ref()
                .and_then(Value::as_list)
                .ok_or("in requires a `values` list")?;
            if !list.iter().all(Value::is_scalar) {
                return Err("in `values` must be scalars".to_string());
            }
            Ok(ConditionKind::In {
                values: list.iter().map(Value::to_string).collect(),
            })
        }
        "greater_than" => Ok(ConditionKind::GreaterThan {
            value: raw.value.clone().ok_or("greater_than requires `value`")?,
        }),
        "regex" => {
            let pattern = raw
                .pattern
                .as_ref()
                .and_then(Value::as_str)
                .ok_or("regex requires a string `pattern`")?;
            let pattern = Regex::new(pattern).map_err(|e| format!("invalid regex: {e}"))?;
            Ok(ConditionKind::Regex { pattern })
        }
        "count" => Ok(ConditionKind::Count {
            window: build_window(raw, field)?,
        }),
        "count_distinct" => {
            let window = build_window(raw, field)?;
            let count_field = raw
                .count_field
                .as_ref()
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .ok_or("count_distinct requires `count_field`")?
                .to_string();
            Ok(ConditionKind::CountDistinct {
                window,
                count_field,
            })
        }
        other => Err(format!("unknown operator `{other}`")),
    }
}

fn build_window(raw: &RawCondition, field: &str) -> Result<Window, String> {
    let column = EventColumn::parse(field)
        .ok_or_else(|| format!("`{field}` is not a countable event column"))?;
    let threshold = match raw.threshold {
        Some(Value::Int(n)) => n,
        _ => return Err("count requires an integer `threshold`".to_string()),
    };
    let time_window_secs = match raw.time_window {
        Some(Value::Int(n)) if n >= 0 => n,
        _ => return Err("count requires a non-negative integer `time_window`".to_string()),
    };
    Ok(Window {
        column,
        threshold,
        time_window_secs,
    })
}

impl From<Condition> for RawCondition {
    fn from(c: Condition) -> Self {
        let mut raw = RawCondition {
            field: Some(Value::String(c.field)),
            operator: Some(Value::from(c.kind.operator())),
            ..Default::default()
        };
        match c.kind {
            ConditionKind::Equals { value } | ConditionKind::GreaterThan { value } => {
                raw.value = Some(value);
            }
            ConditionKind::In { values } => {
                raw.values = Some(Value::List(values.into_iter().map(Value::String).collect()));
            }
            ConditionKind::Regex { pattern } => {
                raw.pattern = Some(Value::String(pattern.as_str().to_string()));
            }
            ConditionKind::Count { window } => set_window(&mut raw, &window),
            ConditionKind::CountDistinct {
                window,
                count_field,
            } => {
                set_window(&mut raw, &window);
                raw.count_field = Some(Value::String(count_field));
            }
            ConditionKind::Invalid { .. } => {}
        }
        raw
    }
}

fn set_window(raw: &mut RawCondition, window: &Window) {
    raw.threshold = Some(Value::Int(window.threshold));
    raw.time_window = Some(Value::Int(window.time_window_secs));
}

// -- Rule actions --

/// Action fired when every condition of a rule holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "RawRuleAction", into = "RawRuleAction")]
pub enum RuleAction {
    CreateIncident { priority: Option<String> },
    ExecutePlaybook { playbook: String },
    Notify {
        channel: Option<String>,
        message: Option<String>,
    },
    /// Unknown type, or a known type with a missing or mistyped field. Logged and skipped.
    Unsupported { kind: String, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawRuleAction {
    #[serde(rename = "type", default)]
    kind: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    playbook: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channel: Option<Value>,
    /// A list whose first entry is used; a bare scalar is taken as one channel.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    channels: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    message: Option<Value>,
}

impl From<RawRuleAction> for RuleAction {
    fn from(raw: RawRuleAction) -> Self {
        let kind = match optional_text(raw.kind.as_ref()) {
            Ok(kind) => kind.unwrap_or_default(),
            Err(e) => {
                return Self::Unsupported {
                    kind: raw.kind.as_ref().map(Value::to_string).unwrap_or_default(),
                    reason: format!("`type` {e}"),
                }
            }
        };
        build_action(&kind, &raw).unwrap_or_else(|reason| Self::Unsupported { kind, reason })
    }
}

fn build_action(kind: &str, raw: &RawRuleAction) -> Result<RuleAction, String> {
    let text = |key: &str, value: Option<&Value>| {
        optional_text(value).map_err(|e| format!("`{key}` {e}"))
    };

    match kind {
        "create_incident" => Ok(RuleAction::CreateIncident {
            priority: text("priority", raw.priority.as_ref())?,
        }),
        "execute_playbook" => {
            let playbook = text("playbook", raw.playbook.as_ref())?
                .filter(|p| !p.is_empty())
                .ok_or("execute_playbook requires `playbook`")?;
            Ok(RuleAction::ExecutePlaybook { playbook })
        }
        "notify" => {
            let channel = match text("channel", raw.channel.as_ref())? {
                Some(channel) => Some(channel),
                None => match &raw.channels {
                    Some(Value::List(items)) => text("channels", items.first())?,
                    other => text("channels", other.as_ref())?,
                },
            };
            Ok(RuleAction::Notify {
                channel,
                message: text("message", raw.message.as_ref())?,
            })
        }
        other => Err(format!("unknown action type `{other}`")),
    }
}

impl From<RuleAction> for RawRuleAction {
    fn from(action: RuleAction) -> Self {
        let text = |s: String| Value::String(s);
        match action {
            RuleAction::CreateIncident { priority } => Self {
                kind: Some(Value::from("create_incident")),
                priority: priority.map(text),
                ..Default::default()
            },
            RuleAction::ExecutePlaybook { playbook } => Self {
                kind: Some(Value::from("execute_playbook")),
                playbook: Some(text(playbook)),
                ..Default::default()
            },
            RuleAction::Notify { channel, message } => Self {
                kind: Some(Value::from("notify")),
                channel: channel.map(text),
                message: message.map(text),
                ..Default::default()
            },
            RuleAction::Unsupported { kind, .. } => Self {
                kind: Some(text(kind)),
                ..Default::default()
            },
        }
    }
}

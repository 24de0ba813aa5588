//! Response playbook definitions as loaded from YAML.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use crate::models::value::{Map, Value};

/// Top-level shape of a playbook file: `playbook: {...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybookDocument {
    pub playbook: Playbook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, deserialize_with = "scalar_string")]
    pub version: String,
    #[serde(default)]
    pub inputs: Vec<PlaybookInput>,
    #[serde(default)]
    pub steps: Vec<PlaybookStep>,
}

impl Playbook {
    /// Structural checks applied at load time.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("playbook id must not be empty".to_string());
        }
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err("step id must not be empty".to_string());
            }
            if step.action.trim().is_empty() {
                return Err(format!("step `{}` has no action", step.id));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(format!("duplicate step id `{}`", step.id));
            }
        }
        Ok(())
    }

    /// First required input not present in `inputs`.
    pub fn first_missing_input(&self, inputs: &Map) -> Option<&str> {
        self.inputs
            .iter()
            .find(|input| input.required && !inputs.contains_key(&input.name))
            .map(|input| input.name.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookInput {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybookStep {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub action: String,
    #[serde(default)]
    pub parameters: Map,
    #[serde(default)]
    pub on_failure: OnFailure,
    /// Template string; the step runs only if it interpolates to `true`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// What to do when a step's action returns an error.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    #[default]
    Abort,
    Continue,
}

/// Accept `version: 1.0` as well as `version: "1.0"`.
fn scalar_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(String::new()),
        Value::Float(x) if x.fract() == 0.0 => Ok(format!("{x:.1}")),
        v if v.is_scalar() => Ok(v.to_string()),
        _ => Err(serde::de::Error::custom("expected a scalar")),
    }
}

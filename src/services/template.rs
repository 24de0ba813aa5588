//! `{{ path }}` interpolation of playbook step parameters.
//!
//! Paths are dot-separated and resolved segment by segment through maps in
//! the execution context. Only strings are rewritten; lists and scalars pass
//! through unchanged and nested maps are recursed.

use crate::models::value::{Map, Value};

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Interpolate every string in `params` against `context`, returning a new map.
pub fn interpolate(params: &Map, context: &Value) -> Map {
    params
        .iter()
        .map(|(key, value)| (key.clone(), interpolate_value(value, context)))
        .collect()
}

pub fn interpolate_value(value: &Value, context: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(interpolate_str(s, context)),
        Value::Map(m) => Value::Map(interpolate(m, context)),
        other => other.clone(),
    }
}

/// Substitute each `{{ path }}` in `s`.
///
/// An unresolvable path is replaced by the path text itself. An unterminated
/// `{{` leaves the remainder of the string as is. Substituted text is never
/// scanned again.
pub fn interpolate_str(s: &str, context: &Value) -> String {
    if !s.contains(OPEN) {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find(OPEN) {
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            break;
        };
        out.push_str(&rest[..start]);
        let path = after_open[..end].trim();
        match resolve(path, context) {
            Some(value) => out.push_str(&value.to_string()),
            None => out.push_str(path),
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    out.push_str(rest);
    out
}

/// Look up a dotted path in the context.
pub fn resolve<'a>(path: &str, context: &'a Value) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    context.get_path(path)
}

/// Step guard check: interpolate and compare against `true`.
pub fn is_truthy(condition: &str, context: &Value) -> bool {
    interpolate_str(condition, context)
        .trim()
        .eq_ignore_ascii_case("true")
}

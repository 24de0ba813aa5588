//! Typed accessors over an action's parameter map.

use std::str::FromStr;

use crate::errors::ActionError;
use crate::models::value::{Params, Value};

/// String parameter; non-string values are treated as absent.
pub fn str_param<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

pub fn string_or(params: &Params, key: &str, default: &str) -> String {
    str_param(params, key)
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
        .to_string()
}

/// Non-empty string parameter or `InvalidParams`.
pub fn required_str<'a>(params: &'a Params, key: &str) -> Result<&'a str, ActionError> {
    str_param(params, key)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ActionError::InvalidParams(format!("{key} parameter is required")))
}

/// Parse a required string parameter into `T`.
pub fn required_parsed<T: FromStr>(params: &Params, key: &str) -> Result<T, ActionError> {
    let raw = required_str(params, key)?;
    raw.trim()
        .parse()
        .map_err(|_| ActionError::InvalidParams(format!("{key} is not valid: {raw}")))
}

/// Non-negative whole number of seconds. Integers, floats and numeric
/// strings are accepted.
pub fn secs_or(params: &Params, key: &str, default: u64) -> u64 {
    match params.get(key) {
        Some(Value::Int(n)) if *n >= 0 => *n as u64,
        Some(Value::Float(x)) if x.is_finite() && *x >= 0.0 => *x as u64,
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

/// Map parameter flattened to string pairs, e.g. HTTP headers.
pub fn string_pairs(params: &Params, key: &str) -> Vec<(String, String)> {
    params
        .get(key)
        .and_then(Value::as_map)
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.to_string())).collect())
        .unwrap_or_default()
}

/// List parameter with each element in its default string form.
pub fn string_list(params: &Params, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_list)
        .map(|items| items.iter().map(Value::to_string).collect())
        .unwrap_or_default()
}

/// A present, non-null parameter.
pub fn present<'a>(params: &'a Params, key: &str) -> Option<&'a Value> {
    params.get(key).filter(|v| !v.is_null())
}

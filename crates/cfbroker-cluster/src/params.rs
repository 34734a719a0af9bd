//! Validation of caller-supplied update parameters.
//!
//! Parameters reach the broker as free-form JSON, so numbers may arrive as
//! floats (`4e8`) or strings (`"400000000"`). Only the keys in
//! [`UPDATABLE_PARAMS`] are accepted, and every value is normalized to the
//! form the cluster expects before it is forwarded.

use serde_json::{Map, Value};
use thiserror::Error;

use cfbroker_core::{Persistence, SnapshotPolicy};

/// Keys a caller may change on an existing database.
pub const UPDATABLE_PARAMS: &[&str] = &[
    "memory_size",
    "replication",
    "data_persistence",
    "snapshot_policy",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("{0} property is not supported")]
    UnknownParam(String),

    #[error("{0} value is of the wrong type")]
    InvalidType(String),

    #[error("{0} value {1:?} is not allowed")]
    InvalidValue(String, String),
}

/// Check `params` against the allow-list and return the normalized map.
pub fn validate_update_params(params: &Map<String, Value>) -> Result<Map<String, Value>, ParamError> {
    let mut normalized = Map::new();
    for (key, value) in params {
        let value = match key.as_str() {
            "memory_size" => Value::from(coerce_u64(value).ok_or_else(|| invalid_type(key))?),
            "replication" => Value::Bool(coerce_bool(value).ok_or_else(|| invalid_type(key))?),
            "data_persistence" => {
                let raw = value.as_str().ok_or_else(|| invalid_type(key))?;
                let persistence = Persistence::parse(raw.trim())
                    .ok_or_else(|| ParamError::InvalidValue(key.clone(), raw.to_string()))?;
                Value::from(persistence.as_str())
            }
            "snapshot_policy" => coerce_snapshot_policy(value).ok_or_else(|| invalid_type(key))?,
            _ => return Err(ParamError::UnknownParam(key.clone())),
        };
        normalized.insert(key.clone(), value);
    }
    Ok(normalized)
}

fn invalid_type(key: &str) -> ParamError {
    ParamError::InvalidType(key.to_string())
}

fn whole_float_to_u64(f: f64) -> Option<u64> {
    (f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f < u64::MAX as f64).then_some(f as u64)
}

fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| n.as_f64().and_then(whole_float_to_u64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<u64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(whole_float_to_u64))
        }
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_policy_entry(value: &Value) -> Option<SnapshotPolicy> {
    let entry = value.as_object()?;
    if entry.keys().any(|k| k != "writes" && k != "secs") {
        return None;
    }
    Some(SnapshotPolicy {
        writes: coerce_u64(entry.get("writes")?)?,
        secs: coerce_u64(entry.get("secs")?)?,
    })
}

/// Accepts a list of `{writes, secs}` entries or a single entry.
fn coerce_snapshot_policy(value: &Value) -> Option<Value> {
    let policies = match value {
        Value::Array(entries) => entries
            .iter()
            .map(coerce_policy_entry)
            .collect::<Option<Vec<_>>>()?,
        Value::Object(_) => vec![coerce_policy_entry(value)?],
        _ => return None,
    };
    serde_json::to_value(policies).ok()
}

//! Policy records and the partial-patch merge.
//!
//! A policy is the JSON form of an evaluator's typed threshold struct,
//! grouped into sections (`{"risk": {"min_expected_roi": 0.12}, ...}`).
//! Patches are deep partial merges validated leaf by leaf against the
//! stored record before anything is committed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::error::TribunalError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub evaluator: String,
    pub version: u64,
    pub updated_at: String,
    pub body: Value,
}

/// One committed patch, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRevision {
    pub revision_id: String,
    pub evaluator: String,
    pub version: u64,
    pub patch: Value,
    pub actor: String,
    pub ts: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyPatch {
    pub body: Value,
    #[serde(default)]
    pub expected_version: Option<u64>,
    #[serde(default = "default_actor")]
    pub actor: String,
}

fn default_actor() -> String {
    "operator".to_string()
}

impl PolicyPatch {
    pub fn new(body: Value) -> Self {
        Self {
            body,
            expected_version: None,
            actor: default_actor(),
        }
    }

    pub fn expecting(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }
}

/// Deserializes a stored policy body into the evaluator's typed struct.
pub fn typed<T: DeserializeOwned>(evaluator: &str, body: &Value) -> Result<T, TribunalError> {
    serde_json::from_value(body.clone()).map_err(|e| {
        TribunalError::evaluator(evaluator, format!("stored policy does not parse: {}", e))
    })
}

/// Deserializes a merged patch candidate. Failures are the caller's input.
pub fn typed_patch<T: DeserializeOwned>(evaluator: &str, body: &Value) -> Result<T, TribunalError> {
    serde_json::from_value(body.clone()).map_err(|e| {
        TribunalError::ValidationError(format!("patched {} policy is invalid: {}", evaluator, e))
    })
}

/// Serializes a typed default policy.
pub fn to_body<T: Serialize>(policy: &T) -> Value {
    // Policy structs hold only plain numbers and booleans.
    serde_json::to_value(policy).unwrap_or(Value::Null)
}

/// Returns `current` with `patch` merged in. Every patched key must already
/// exist, objects merge recursively and every leaf must keep its type.
pub fn merge_patch(current: &Value, patch: &Value) -> Result<Value, TribunalError> {
    let Value::Object(current_map) = current else {
        return Err(TribunalError::ValidationError(
            "stored policy is not an object".to_string(),
        ));
    };
    let Value::Object(patch_map) = patch else {
        return Err(TribunalError::ValidationError(
            "policy patch must be a JSON object".to_string(),
        ));
    };
    if patch_map.is_empty() {
        return Err(TribunalError::ValidationError(
            "policy patch is empty".to_string(),
        ));
    }
    let mut merged = current_map.clone();
    merge_into(&mut merged, patch_map, "")?;
    Ok(Value::Object(merged))
}

fn merge_into(
    target: &mut Map<String, Value>,
    patch: &Map<String, Value>,
    prefix: &str,
) -> Result<(), TribunalError> {
    for (key, new_value) in patch {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        let Some(slot) = target.get_mut(key) else {
            return Err(TribunalError::ValidationError(format!(
                "unknown policy field '{}'",
                path
            )));
        };
        match (slot, new_value) {
            (Value::Object(inner), Value::Object(inner_patch)) => {
                merge_into(inner, inner_patch, &path)?;
            }
            (Value::Object(_), _) => {
                return Err(TribunalError::ValidationError(format!(
                    "policy field '{}' is a section; patch it with an object",
                    path
                )));
            }
            (slot, new_value) => {
                check_leaf(&path, slot, new_value)?;
                // Float slots stay floats so they keep accepting fractions later.
                *slot = match (slot.is_f64(), new_value.as_f64()) {
                    (true, Some(f)) => Value::from(f),
                    _ => new_value.clone(),
                };
            }
        }
    }
    Ok(())
}

fn check_leaf(path: &str, current: &Value, new_value: &Value) -> Result<(), TribunalError> {
    let ok = match current {
        Value::Bool(_) => new_value.is_boolean(),
        Value::Number(n) if n.is_i64() || n.is_u64() => new_value.is_i64(),
        Value::Number(_) => new_value.is_number(),
        Value::String(_) => new_value.is_string(),
        _ => false,
    };
    if ok {
        Ok(())
    } else {
        Err(TribunalError::ValidationError(format!(
            "policy field '{}' expects {}, got {}",
            path,
            leaf_kind(current),
            new_value
        )))
    }
}

fn leaf_kind(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "an integer",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        _ => "a section",
    }
}

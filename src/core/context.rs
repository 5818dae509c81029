//! Evaluation context and its typed schema.
//!
//! Callers hand the engine a flat `key -> string` map. Each evaluator declares
//! the fields it reads, with their kind and the default used when a key is
//! missing; the map is parsed once against the union of those declarations
//! before any evaluator runs. Evaluators only ever see the typed view.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::error::TribunalError;

/// Subject of one evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    pub context_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Context {
    pub fn new(context_type: impl Into<String>) -> Self {
        Self {
            context_type: context_type.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.data.insert(key.into(), value.to_string());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl ToString) {
        self.data.insert(key.into(), value.to_string());
    }

    /// SHA-256 over the canonical JSON form. `data` is ordered, so equal
    /// contexts always hash the same.
    pub fn digest(&self) -> String {
        let canonical = serde_json::json!({
            "context_type": self.context_type,
            "data": self.data,
        });
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    Integer,
    Bool,
    Text,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::Number => "number",
            FieldKind::Integer => "integer",
            FieldKind::Bool => "bool",
            FieldKind::Text => "text",
        };
        f.write_str(s)
    }
}

/// Documented default of a context field; its variant fixes the field kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Number(f64),
    Integer(i64),
    Bool(bool),
    Text(&'static str),
}

impl FieldDefault {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldDefault::Number(_) => FieldKind::Number,
            FieldDefault::Integer(_) => FieldKind::Integer,
            FieldDefault::Bool(_) => FieldKind::Bool,
            FieldDefault::Text(_) => FieldKind::Text,
        }
    }

    fn value(&self) -> FieldValue {
        match *self {
            FieldDefault::Number(n) => FieldValue::Number(n),
            FieldDefault::Integer(i) => FieldValue::Integer(i),
            FieldDefault::Bool(b) => FieldValue::Bool(b),
            FieldDefault::Text(t) => FieldValue::Text(t.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub default: FieldDefault,
    pub doc: &'static str,
}

impl FieldSpec {
    pub const fn new(name: &'static str, default: FieldDefault, doc: &'static str) -> Self {
        Self {
            name,
            aliases: &[],
            default,
            doc,
        }
    }

    pub const fn with_aliases(mut self, aliases: &'static [&'static str]) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn kind(&self) -> FieldKind {
        self.default.kind()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Integer(i64),
    Bool(bool),
    Text(String),
}

/// Union of the field declarations of a set of evaluators.
#[derive(Debug, Clone, Default)]
pub struct ContextSchema {
    fields: BTreeMap<&'static str, FieldSpec>,
}

impl ContextSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `specs`; a field already declared with another kind is rejected.
    pub fn extend(&mut self, owner: &str, specs: &[FieldSpec]) -> Result<(), TribunalError> {
        for spec in specs {
            if let Some(existing) = self.fields.get(spec.name) {
                if existing.kind() != spec.kind() {
                    return Err(TribunalError::ValidationError(format!(
                        "context field '{}' declared by {} as {} but already declared as {}",
                        spec.name,
                        owner,
                        spec.kind(),
                        existing.kind()
                    )));
                }
                continue;
            }
            self.fields.insert(spec.name, *spec);
        }
        Ok(())
    }

    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    /// Parses every declared field of `ctx`. Missing or empty keys take the
    /// declared default; a present value that does not parse as the declared
    /// kind is an input error naming the field.
    pub fn validate(&self, ctx: &Context) -> Result<TypedContext, TribunalError> {
        if ctx.context_type.trim().is_empty() {
            return Err(TribunalError::ValidationError(
                "context_type must not be empty".to_string(),
            ));
        }

        let mut values = BTreeMap::new();
        let mut supplied = Vec::new();
        for spec in self.fields.values() {
            let raw = std::iter::once(spec.name)
                .chain(spec.aliases.iter().copied())
                .filter_map(|key| ctx.data.get(key))
                .map(|v| v.trim())
                .find(|v| !v.is_empty());

            let value = match raw {
                Some(raw) => {
                    supplied.push(spec.name.to_string());
                    parse_value(spec, raw)?
                }
                None => spec.default.value(),
            };
            values.insert(spec.name.to_string(), value);
        }

        Ok(TypedContext {
            context_type: ctx.context_type.clone(),
            values,
            supplied,
        })
    }
}

fn parse_value(spec: &FieldSpec, raw: &str) -> Result<FieldValue, TribunalError> {
    let invalid = || {
        TribunalError::ValidationError(format!(
            "context field '{}' expects {}, got '{}'",
            spec.name,
            spec.kind(),
            raw
        ))
    };
    match spec.kind() {
        FieldKind::Number => raw
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(FieldValue::Number)
            .ok_or_else(invalid),
        FieldKind::Integer => {
            if let Ok(i) = raw.parse::<i64>() {
                return Ok(FieldValue::Integer(i));
            }
            match raw.parse::<f64>() {
                // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound.
                Ok(n) if n.fract() == 0.0 && n >= i64::MIN as f64 && n < i64::MAX as f64 => {
                    Ok(FieldValue::Integer(n as i64))
                }
                _ => Err(invalid()),
            }
        }
        FieldKind::Bool => parse_flag(raw).map(FieldValue::Bool).ok_or_else(invalid),
        FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
    }
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

/// Context after schema validation. Immutable.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedContext {
    context_type: String,
    values: BTreeMap<String, FieldValue>,
    supplied: Vec<String>,
}

impl TypedContext {
    pub fn context_type(&self) -> &str {
        &self.context_type
    }

    /// Whether the caller supplied the field (as opposed to it taking its default).
    pub fn is_supplied(&self, name: &str) -> bool {
        self.supplied.iter().any(|s| s == name)
    }

    pub fn number(&self, name: &str) -> Result<f64, TribunalError> {
        match self.get(name)? {
            FieldValue::Number(n) => Ok(*n),
            FieldValue::Integer(i) => Ok(*i as f64),
            other => Err(kind_mismatch(name, "number", other)),
        }
    }

    pub fn integer(&self, name: &str) -> Result<i64, TribunalError> {
        match self.get(name)? {
            FieldValue::Integer(i) => Ok(*i),
            other => Err(kind_mismatch(name, "integer", other)),
        }
    }

    pub fn flag(&self, name: &str) -> Result<bool, TribunalError> {
        match self.get(name)? {
            FieldValue::Bool(b) => Ok(*b),
            other => Err(kind_mismatch(name, "bool", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<&str, TribunalError> {
        match self.get(name)? {
            FieldValue::Text(t) => Ok(t.as_str()),
            other => Err(kind_mismatch(name, "text", other)),
        }
    }

    fn get(&self, name: &str) -> Result<&FieldValue, TribunalError> {
        self.values.get(name).ok_or_else(|| {
            TribunalError::ValidationError(format!("context field '{}' is not declared", name))
        })
    }
}

fn kind_mismatch(name: &str, wanted: &str, got: &FieldValue) -> TribunalError {
    TribunalError::ValidationError(format!(
        "context field '{}' read as {} but holds {:?}",
        name, wanted, got
    ))
}

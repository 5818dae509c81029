//! Evaluator registry: ordered, name-indexed, schema-consistent.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use crate::core::context::ContextSchema;
use crate::core::error::TribunalError;
use crate::core::evaluator::{Evaluator, EvaluatorInfo};

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{0,31}$").expect("static pattern"))
}

#[derive(Clone, Default)]
pub struct EvaluatorRegistry {
    evaluators: Vec<Arc<dyn Evaluator>>,
    schema: ContextSchema,
}

impl EvaluatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `evaluator` after its name; rejects duplicates, malformed
    /// names and context fields that clash with an earlier declaration.
    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) -> Result<(), TribunalError> {
        let name = evaluator.name();
        if !name_pattern().is_match(name) {
            return Err(TribunalError::ValidationError(format!(
                "evaluator name '{}' must be lowercase snake_case",
                name
            )));
        }
        if self.get(name).is_some() {
            return Err(TribunalError::ValidationError(format!(
                "evaluator '{}' is already registered",
                name
            )));
        }
        evaluator.check_policy(&evaluator.default_policy())?;
        self.schema.extend(name, evaluator.fields())?;
        self.evaluators.push(evaluator);
        Ok(())
    }

    pub fn with(mut self, evaluator: Arc<dyn Evaluator>) -> Result<Self, TribunalError> {
        self.register(evaluator)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Evaluator>> {
        self.evaluators.iter().find(|e| e.name() == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.evaluators.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }

    pub fn infos(&self) -> Vec<EvaluatorInfo> {
        self.evaluators
            .iter()
            .map(|e| EvaluatorInfo::of(e.as_ref()))
            .collect()
    }

    pub fn defaults(&self) -> Vec<(String, Value)> {
        self.evaluators
            .iter()
            .map(|e| (e.name().to_string(), e.default_policy()))
            .collect()
    }

    /// Resolves a request list. `None` or empty means every registered
    /// evaluator in registration order; otherwise the request order is kept.
    /// Fails before any work on unknown or repeated names.
    pub fn resolve(
        &self,
        requested: Option<&[String]>,
    ) -> Result<Vec<Arc<dyn Evaluator>>, TribunalError> {
        let requested = match requested {
            Some(list) if !list.is_empty() => list,
            _ => return Ok(self.evaluators.clone()),
        };
        let mut seen = HashSet::new();
        let mut out = Vec::with_capacity(requested.len());
        for name in requested {
            let name = name.trim();
            let evaluator = self
                .get(name)
                .ok_or_else(|| TribunalError::UnknownEvaluator(name.to_string()))?;
            if !seen.insert(name) {
                return Err(TribunalError::ValidationError(format!(
                    "evaluator '{}' requested more than once",
                    name
                )));
            }
            out.push(Arc::clone(evaluator));
        }
        Ok(out)
    }

    /// Context schema covering exactly `evaluators`.
    pub fn schema_for(
        &self,
        evaluators: &[Arc<dyn Evaluator>],
    ) -> Result<ContextSchema, TribunalError> {
        if evaluators.len() == self.evaluators.len() {
            return Ok(self.schema.clone());
        }
        let mut schema = ContextSchema::new();
        for e in evaluators {
            schema.extend(e.name(), e.fields())?;
        }
        Ok(schema)
    }
}

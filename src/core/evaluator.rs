//! The evaluator contract.
//!
//! An evaluator owns one axis of judgment and one policy record. It is a
//! pure function of the validated context and the policy handed to it:
//! no I/O, no caching, no hidden state.

use serde::Serialize;
use serde_json::Value;

use crate::core::context::{FieldSpec, TypedContext};
use crate::core::decision::{Decision, Severity};
use crate::core::error::TribunalError;

pub trait Evaluator: Send + Sync {
    /// Registry key, also used in `blocked_by` and policy routes.
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Context fields read by `evaluate`, with their documented defaults.
    fn fields(&self) -> &'static [FieldSpec];

    /// Policy seeded on first boot.
    fn default_policy(&self) -> Value;

    /// Rejects a policy body the evaluator could not work with.
    fn check_policy(&self, body: &Value) -> Result<(), TribunalError>;

    fn evaluate(&self, ctx: &TypedContext, policy: &Value) -> Result<Decision, TribunalError>;
}

/// Descriptor for listings.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatorInfo {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub kind: String,
    pub default: String,
    pub doc: String,
}

impl EvaluatorInfo {
    pub fn of(evaluator: &dyn Evaluator) -> Self {
        use crate::core::context::FieldDefault;
        Self {
            name: evaluator.name().to_string(),
            description: evaluator.description().to_string(),
            fields: evaluator
                .fields()
                .iter()
                .map(|f| FieldInfo {
                    name: f.name.to_string(),
                    kind: f.kind().to_string(),
                    default: match f.default {
                        FieldDefault::Number(n) => n.to_string(),
                        FieldDefault::Integer(i) => i.to_string(),
                        FieldDefault::Bool(b) => b.to_string(),
                        FieldDefault::Text(t) => t.to_string(),
                    },
                    doc: f.doc.to_string(),
                })
                .collect(),
        }
    }
}

/// Triggered rules in discovery order, each tagged with its severity.
#[derive(Debug, Default)]
pub struct Findings {
    items: Vec<(Severity, String)>,
}

impl Findings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, reason: impl Into<String>) {
        self.items.push((Severity::Warn, reason.into()));
    }

    pub fn block(&mut self, reason: impl Into<String>) {
        self.items.push((Severity::Critical, reason.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Any critical finding denies; warnings alone allow; nothing found approves.
    pub fn into_decision(self, notes: Notes) -> Decision {
        let worst = self.items.iter().map(|(s, _)| *s).max();
        let reasons: Vec<String> = self.items.into_iter().map(|(_, r)| r).collect();
        match worst {
            None => Decision::approve(notes.approve),
            Some(Severity::Critical) => Decision::deny(reasons, notes.deny),
            Some(_) => Decision::warn(reasons, notes.warn),
        }
    }
}

/// Closing note per outcome.
pub struct Notes {
    pub approve: &'static str,
    pub warn: &'static str,
    pub deny: &'static str,
}

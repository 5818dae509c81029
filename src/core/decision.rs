//! Verdict types shared by evaluators, the orchestrator and every gate.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::TribunalError;

/// Ordinal concern level. Declaration order is the ranking: `Info < Warn < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = TribunalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warn" | "warning" => Ok(Severity::Warn),
            "critical" => Ok(Severity::Critical),
            other => Err(TribunalError::ValidationError(format!(
                "unknown severity '{}'",
                other
            ))),
        }
    }
}

/// Output of one evaluator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub severity: Severity,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Decision {
    pub fn approve(notes: impl Into<String>) -> Self {
        Self {
            allowed: true,
            severity: Severity::Info,
            reasons: Vec::new(),
            notes: Some(notes.into()),
        }
    }

    pub fn warn(reasons: Vec<String>, notes: impl Into<String>) -> Self {
        Self {
            allowed: true,
            severity: Severity::Warn,
            reasons,
            notes: Some(notes.into()),
        }
    }

    pub fn deny(reasons: Vec<String>, notes: impl Into<String>) -> Self {
        Self {
            allowed: false,
            severity: Severity::Critical,
            reasons,
            notes: Some(notes.into()),
        }
    }

    /// Deny+critical is the only combination that blocks an aggregate.
    pub fn is_hard_block(&self) -> bool {
        !self.allowed && self.severity == Severity::Critical
    }

    /// Checks the evaluator contract: a denial is always critical and always explains itself.
    pub fn check_contract(&self) -> Result<(), String> {
        if !self.allowed && self.severity != Severity::Critical {
            return Err(format!(
                "denied with severity '{}' instead of 'critical'",
                self.severity
            ));
        }
        if !self.allowed && self.reasons.is_empty() {
            return Err("denied without any reason".to_string());
        }
        if self.allowed && self.severity == Severity::Info && !self.reasons.is_empty() {
            return Err("clean approval carries reasons".to_string());
        }
        Ok(())
    }
}

/// One `(name, Decision)` pair of an aggregate, serialized flat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub evaluator: String,
    #[serde(flatten)]
    pub decision: Decision,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateDecision {
    pub overall_allowed: bool,
    pub worst_severity: Severity,
    #[serde(default)]
    pub blocked_by: Vec<String>,
    #[serde(default)]
    pub checks: Vec<CheckResult>,
    pub summary: String,
}

impl AggregateDecision {
    /// Pure reduction over already computed checks; order of `checks` is kept.
    pub fn from_checks(checks: Vec<CheckResult>) -> Self {
        let worst_severity = checks
            .iter()
            .map(|c| c.decision.severity)
            .max()
            .unwrap_or(Severity::Info);
        let blocked_by: Vec<String> = checks
            .iter()
            .filter(|c| c.decision.is_hard_block())
            .map(|c| c.evaluator.clone())
            .collect();
        let overall_allowed = blocked_by.is_empty();
        let summary = summarize(overall_allowed, worst_severity, &blocked_by);
        Self {
            overall_allowed,
            worst_severity,
            blocked_by,
            checks,
            summary,
        }
    }

    pub fn check(&self, evaluator: &str) -> Option<&Decision> {
        self.checks
            .iter()
            .find(|c| c.evaluator == evaluator)
            .map(|c| &c.decision)
    }
}

fn summarize(overall_allowed: bool, worst: Severity, blocked_by: &[String]) -> String {
    if !overall_allowed {
        format!(
            "Denied; hard block from: {}. Worst severity: {}.",
            blocked_by.join(", "),
            worst
        )
    } else if worst == Severity::Info {
        "All evaluators approve.".to_string()
    } else {
        format!("Allowed with warnings; worst severity: {}.", worst)
    }
}

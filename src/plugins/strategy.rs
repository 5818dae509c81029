//! Strategic-fit evaluator: focus, payoff and complexity of new initiatives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::context::{FieldDefault, FieldSpec, TypedContext};
use crate::core::decision::Decision;
use crate::core::error::TribunalError;
use crate::core::evaluator::{Evaluator, Findings, Notes};
use crate::core::policy;

pub const NAME: &str = "strategy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyLimits {
    pub max_active_verticals: i64,
    pub min_estimated_annual_profit: f64,
    /// 1-10 scale.
    pub max_complexity_score: i64,
    pub max_time_to_break_even_months: i64,
    /// 0-10; at or above this a non-critical project is a distraction.
    pub distraction_threshold: i64,
}

impl Default for StrategyLimits {
    fn default() -> Self {
        Self {
            max_active_verticals: 5,
            min_estimated_annual_profit: 100_000.0,
            max_complexity_score: 7,
            max_time_to_break_even_months: 18,
            distraction_threshold: 7,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyPolicy {
    pub strategy: StrategyLimits,
}

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("active_verticals", FieldDefault::Integer(0), "Verticals already running"),
    FieldSpec::new("new_verticals", FieldDefault::Integer(1), "Verticals this plan adds"),
    FieldSpec::new(
        "estimated_annual_profit",
        FieldDefault::Number(0.0),
        "Projected yearly profit",
    ),
    FieldSpec::new("complexity_score", FieldDefault::Integer(0), "Complexity, 1-10"),
    FieldSpec::new(
        "time_to_break_even_months",
        FieldDefault::Integer(0),
        "Months until break-even",
    ),
    FieldSpec::new("mission_critical", FieldDefault::Bool(false), "Serves the main path"),
    FieldSpec::new("distraction_score", FieldDefault::Integer(0), "Distraction, 0-10"),
];

const NOTES: Notes = Notes {
    approve: "Strategically sound.",
    warn: "Allowed with strategic warnings.",
    deny: "Denied; not aligned with strategic focus or limits.",
};

pub struct StrategicFit;

/// Strictly above the ceiling blocks; sitting on it warns.
fn ceiling(findings: &mut Findings, value: i64, limit: i64, what: &str, unit: &str) {
    if value > limit {
        findings.block(format!(
            "{} {}{} exceeds the limit of {}{}.",
            what, value, unit, limit, unit
        ));
    } else if value == limit {
        findings.warn(format!("{} {}{} is at the limit.", what, value, unit));
    }
}

impl Evaluator for StrategicFit {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Vertical sprawl, projected profit, complexity, break-even time and distraction"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn default_policy(&self) -> Value {
        policy::to_body(&StrategyPolicy::default())
    }

    fn check_policy(&self, body: &Value) -> Result<(), TribunalError> {
        let p: StrategyPolicy = policy::typed_patch(NAME, body)?;
        if p.strategy.max_active_verticals < 1 {
            return Err(TribunalError::ValidationError(
                "strategy.max_active_verticals must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn evaluate(&self, ctx: &TypedContext, body: &Value) -> Result<Decision, TribunalError> {
        let p: StrategyPolicy = policy::typed(NAME, body)?;
        let s = &p.strategy;
        let total_verticals = ctx
            .integer("active_verticals")?
            .saturating_add(ctx.integer("new_verticals")?);
        let profit = ctx.number("estimated_annual_profit")?;
        let complexity = ctx.integer("complexity_score")?;
        let break_even = ctx.integer("time_to_break_even_months")?;
        let mission_critical = ctx.flag("mission_critical")?;
        let distraction = ctx.integer("distraction_score")?;

        let mut findings = Findings::new();

        ceiling(
            &mut findings,
            total_verticals,
            s.max_active_verticals,
            "Total verticals after expansion",
            "",
        );
        if profit < s.min_estimated_annual_profit {
            findings.warn(format!(
                "Estimated annual profit {} is below the minimum {}.",
                profit, s.min_estimated_annual_profit
            ));
        }
        ceiling(
            &mut findings,
            complexity,
            s.max_complexity_score,
            "Complexity score",
            "/10",
        );
        ceiling(
            &mut findings,
            break_even,
            s.max_time_to_break_even_months,
            "Break-even time",
            " months",
        );
        if !mission_critical && distraction >= s.distraction_threshold {
            findings.block(format!(
                "Project is not mission-critical and has a distraction score of {}/10.",
                distraction
            ));
        }

        Ok(findings.into_decision(NOTES))
    }
}

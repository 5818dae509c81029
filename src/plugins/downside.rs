//! Downside-risk evaluator.
//!
//! Looks at how bad things can get instead of how good: worst-case loss
//! relative to capital at risk, probability of ruin, correlation with the
//! rest of the portfolio and hidden complexity. Every measure has its own
//! ceiling; breaching any one denies, approaching one warns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::context::{FieldDefault, FieldSpec, TypedContext};
use crate::core::decision::Decision;
use crate::core::error::TribunalError;
use crate::core::evaluator::{Evaluator, Findings, Notes};
use crate::core::policy;

pub const NAME: &str = "downside";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskProfile {
    /// Worst-case loss over capital at risk; 1.5 means losing 150% is too much.
    pub max_downside_multiplier: f64,
    pub max_probability_of_ruin: f64,
    pub max_correlation_with_portfolio: f64,
    /// 1-10 scale.
    pub max_hidden_complexity_score: i64,
    /// Share of a ceiling from which a measure counts as approaching it.
    pub approach_ratio: f64,
}

impl Default for RiskProfile {
    fn default() -> Self {
        Self {
            max_downside_multiplier: 1.5,
            max_probability_of_ruin: 0.05,
            max_correlation_with_portfolio: 0.80,
            max_hidden_complexity_score: 7,
            approach_ratio: 0.8,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DownsidePolicy {
    pub risk: RiskProfile,
}

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("capital_at_risk", FieldDefault::Number(0.0), "Capital exposed"),
    FieldSpec::new("worst_case_loss", FieldDefault::Number(0.0), "Loss in the worst case"),
    FieldSpec::new("probability_of_ruin", FieldDefault::Number(0.0), "Chance of ruin, 0-1"),
    FieldSpec::new(
        "correlation_with_portfolio",
        FieldDefault::Number(0.0),
        "Correlation with existing risk, 0-1",
    ),
    FieldSpec::new(
        "hidden_complexity_score",
        FieldDefault::Integer(0),
        "Unknowns and entanglement, 1-10",
    ),
];

const NOTES: Notes = Notes {
    approve: "No major hidden downside beyond configured limits.",
    warn: "Allowed with severe caution; downside approaching limits.",
    deny: "Denied; downside or entanglement risk is too high.",
};

pub struct DownsideRisk;

struct Measure<'a> {
    label: &'a str,
    value: f64,
    limit: f64,
    shown: String,
    limit_shown: String,
}

fn judge(findings: &mut Findings, m: Measure<'_>, approach_ratio: f64) {
    if m.value > m.limit {
        findings.block(format!(
            "{} {} exceeds the limit of {}.",
            m.label, m.shown, m.limit_shown
        ));
    } else if m.value >= m.limit * approach_ratio && m.value > 0.0 {
        findings.warn(format!(
            "{} {} is approaching the limit of {}.",
            m.label, m.shown, m.limit_shown
        ));
    }
}

fn pct(v: f64) -> String {
    format!("{:.2}%", v * 100.0)
}

impl Evaluator for DownsideRisk {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Worst-case loss, probability of ruin, portfolio correlation and hidden complexity"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn default_policy(&self) -> Value {
        policy::to_body(&DownsidePolicy::default())
    }

    fn check_policy(&self, body: &Value) -> Result<(), TribunalError> {
        let p: DownsidePolicy = policy::typed_patch(NAME, body)?;
        if !(0.0..=1.0).contains(&p.risk.approach_ratio) {
            return Err(TribunalError::ValidationError(format!(
                "risk.approach_ratio must lie in 0..=1, got {}",
                p.risk.approach_ratio
            )));
        }
        Ok(())
    }

    fn evaluate(&self, ctx: &TypedContext, body: &Value) -> Result<Decision, TribunalError> {
        let p: DownsidePolicy = policy::typed(NAME, body)?;
        let r = &p.risk;
        let capital = ctx.number("capital_at_risk")?;
        let worst_case = ctx.number("worst_case_loss")?;
        let ruin = ctx.number("probability_of_ruin")?;
        let correlation = ctx.number("correlation_with_portfolio")?;
        let hidden = ctx.integer("hidden_complexity_score")?;

        let mut findings = Findings::new();

        if capital > 0.0 {
            let multiplier = worst_case / capital;
            judge(
                &mut findings,
                Measure {
                    label: "Downside",
                    value: multiplier,
                    limit: r.max_downside_multiplier,
                    shown: format!("{:.2}x capital", multiplier),
                    limit_shown: format!("{:.2}x", r.max_downside_multiplier),
                },
                r.approach_ratio,
            );
        }
        judge(
            &mut findings,
            Measure {
                label: "Probability of ruin",
                value: ruin,
                limit: r.max_probability_of_ruin,
                shown: pct(ruin),
                limit_shown: pct(r.max_probability_of_ruin),
            },
            r.approach_ratio,
        );
        judge(
            &mut findings,
            Measure {
                label: "Correlation with portfolio",
                value: correlation,
                limit: r.max_correlation_with_portfolio,
                shown: pct(correlation),
                limit_shown: pct(r.max_correlation_with_portfolio),
            },
            r.approach_ratio,
        );
        judge(
            &mut findings,
            Measure {
                label: "Hidden complexity score",
                value: hidden as f64,
                limit: r.max_hidden_complexity_score as f64,
                shown: format!("{}/10", hidden),
                limit_shown: format!("{}/10", r.max_hidden_complexity_score),
            },
            r.approach_ratio,
        );

        Ok(findings.into_decision(NOTES))
    }
}

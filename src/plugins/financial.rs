//! Financial-risk evaluator.
//!
//! Judges the money side of a deal: outlay size, repair exposure, return on
//! the outlay and leverage. `predatory` is a red-line; a deal whose after-repair
//! value sits below its price is a guaranteed loss and is denied as well.
//! A weak return only warns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::context::{FieldDefault, FieldSpec, TypedContext};
use crate::core::decision::Decision;
use crate::core::error::TribunalError;
use crate::core::evaluator::{Evaluator, Findings, Notes};
use crate::core::policy;

pub const NAME: &str = "financial";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskTolerance {
    /// Largest outlay allowed without an override.
    pub max_allowed_investment: f64,
    pub min_expected_roi: f64,
    /// Repairs above this share of the price are flagged.
    pub max_repair_risk_factor: f64,
    pub allow_high_leverage: bool,
    pub max_leverage_ratio: f64,
}

impl Default for RiskTolerance {
    fn default() -> Self {
        Self {
            max_allowed_investment: 500_000.0,
            min_expected_roi: 0.12,
            max_repair_risk_factor: 0.30,
            allow_high_leverage: false,
            max_leverage_ratio: 0.80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mission {
    pub prioritize_cashflow: bool,
    pub prioritize_equity_growth: bool,
    pub prioritize_passive_income: bool,
    pub prioritize_speed: bool,
}

impl Default for Mission {
    fn default() -> Self {
        Self {
            prioritize_cashflow: true,
            prioritize_equity_growth: true,
            prioritize_passive_income: false,
            prioritize_speed: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Values {
    pub transparency: bool,
    pub sustainability: bool,
    pub minimal_risk: bool,
    pub ethical_acquisition: bool,
    pub avoid_predatory_tactics: bool,
}

impl Default for Values {
    fn default() -> Self {
        Self {
            transparency: true,
            sustainability: true,
            minimal_risk: true,
            ethical_acquisition: true,
            avoid_predatory_tactics: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinancialPolicy {
    pub risk: RiskTolerance,
    pub mission: Mission,
    pub values: Values,
}

const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("purchase_price", FieldDefault::Number(0.0), "Proposed outlay")
        .with_aliases(&["price"]),
    FieldSpec::new("repairs", FieldDefault::Number(0.0), "Repair budget"),
    FieldSpec::new("arv", FieldDefault::Number(0.0), "After-repair value"),
    FieldSpec::new(
        "roi",
        FieldDefault::Number(0.0),
        "Expected return; derived from arv/price/repairs when absent or zero",
    ),
    FieldSpec::new("leverage_ratio", FieldDefault::Number(0.0), "Debt share of the outlay, 0-1"),
    FieldSpec::new("predatory", FieldDefault::Bool(false), "Red-line: predatory practice"),
    FieldSpec::new(
        "environmental_risk",
        FieldDefault::Bool(false),
        "Deal carries environmental harm",
    ),
    FieldSpec::new(
        "mission_target",
        FieldDefault::Text(""),
        "equity | cashflow | passive_income | speed",
    ),
];

const NOTES: Notes = Notes {
    approve: "Financial risk within tolerance.",
    warn: "Allowed with financial warnings.",
    deny: "Denied on financial red-lines.",
};

pub struct FinancialRisk;

impl FinancialRisk {
    /// Explicit ROI when given, otherwise `(arv - price - repairs) / price`.
    pub fn effective_roi(price: f64, repairs: f64, arv: f64, roi: f64) -> Option<f64> {
        if roi != 0.0 {
            return Some(roi);
        }
        if price > 0.0 && arv > 0.0 {
            return Some((arv - price - repairs) / price);
        }
        None
    }
}

impl Evaluator for FinancialRisk {
    fn name(&self) -> &'static str {
        NAME
    }

    fn description(&self) -> &'static str {
        "Outlay size, repair exposure, return on outlay, leverage and predatory practices"
    }

    fn fields(&self) -> &'static [FieldSpec] {
        FIELDS
    }

    fn default_policy(&self) -> Value {
        policy::to_body(&FinancialPolicy::default())
    }

    fn check_policy(&self, body: &Value) -> Result<(), TribunalError> {
        let p: FinancialPolicy = policy::typed_patch(NAME, body)?;
        if p.risk.max_repair_risk_factor < 0.0 || p.risk.max_leverage_ratio < 0.0 {
            return Err(TribunalError::ValidationError(
                "financial ratios must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    fn evaluate(&self, ctx: &TypedContext, body: &Value) -> Result<Decision, TribunalError> {
        let p: FinancialPolicy = policy::typed(NAME, body)?;
        let price = ctx.number("purchase_price")?;
        let repairs = ctx.number("repairs")?;
        let arv = ctx.number("arv")?;
        let roi = ctx.number("roi")?;
        let leverage = ctx.number("leverage_ratio")?;

        let mut findings = Findings::new();

        if price > p.risk.max_allowed_investment {
            findings.warn(format!(
                "Price {} exceeds max allowed investment {}.",
                price, p.risk.max_allowed_investment
            ));
        }
        if price > 0.0 && repairs > price * p.risk.max_repair_risk_factor {
            findings.warn(format!(
                "Repairs {} exceed {:.0}% of purchase price.",
                repairs,
                p.risk.max_repair_risk_factor * 100.0
            ));
        }
        if let Some(roi) = Self::effective_roi(price, repairs, arv, roi)
            && roi < p.risk.min_expected_roi
        {
            findings.warn(format!(
                "ROI {:.2}% is below minimum expected {:.2}%.",
                roi * 100.0,
                p.risk.min_expected_roi * 100.0
            ));
        }
        if !p.risk.allow_high_leverage && leverage > p.risk.max_leverage_ratio {
            findings.warn(format!(
                "Leverage {:.0}% exceeds {:.0}% without high-leverage approval.",
                leverage * 100.0,
                p.risk.max_leverage_ratio * 100.0
            ));
        }
        if arv > 0.0 && price > 0.0 && arv < price {
            findings.block("ARV is lower than purchase price; guaranteed loss.");
        }

        if p.values.avoid_predatory_tactics && ctx.flag("predatory")? {
            findings.block("Deal flagged as predatory; predatory practices are forbidden.");
        }
        if p.values.sustainability && ctx.flag("environmental_risk")? {
            findings.warn("Deal flagged as environmentally harmful.");
        }

        let target = ctx.text("mission_target")?;
        let prioritized = match target {
            "equity" => Some(p.mission.prioritize_equity_growth),
            "cashflow" => Some(p.mission.prioritize_cashflow),
            "passive_income" => Some(p.mission.prioritize_passive_income),
            "speed" => Some(p.mission.prioritize_speed),
            _ => None,
        };
        if prioritized == Some(false) {
            findings.warn(format!(
                "Mission conflict: {} is not a current priority.",
                target
            ));
        }

        Ok(findings.into_decision(NOTES))
    }
}

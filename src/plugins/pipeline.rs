//! Governance-gated deal pipeline.
//!
//! A deal request is turned into a `deal` context, judged by the full panel
//! and handed to the pipeline runner only on approval. A denial surfaces as
//! [`TribunalError::GovernanceBlocked`] carrying the whole aggregate; the
//! runner is not touched at all.

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::info;

use crate::core::context::Context;
use crate::core::error::TribunalError;
use crate::core::gate::{Gate, Guarded};
use crate::core::output;
use crate::core::time;

pub const CONTEXT_TYPE: &str = "deal";
pub const BLOCKED_MESSAGE: &str = "Governance blocked this deal pipeline execution.";

#[derive(Parser, Debug)]
#[clap(name = "pipeline", about = "Run a deal pipeline request through the governance gate")]
pub struct PipelineCli {
    /// Path to the deal pipeline request (JSON).
    #[clap(long)]
    pub json: PathBuf,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

/// Deal pipeline payload. Sections other than the three read here are passed
/// to the runner untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DealPipelineRequest {
    #[serde(default)]
    pub deal: Option<Map<String, Value>>,
    #[serde(default)]
    pub underwriting: Option<Map<String, Value>>,
    /// Raw context overrides; any key here beats the derived value.
    #[serde(default)]
    pub governance: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub rest: Map<String, Value>,
}

/// Downstream pipeline, reached only after approval.
pub trait PipelineRunner {
    fn run(&self, request: &DealPipelineRequest) -> Result<Value, TribunalError>;
}

/// Runner that executes nothing and reports what would have been run.
pub struct DryRunPipeline;

impl PipelineRunner for DryRunPipeline {
    fn run(&self, request: &DealPipelineRequest) -> Result<Value, TribunalError> {
        Ok(serde_json::json!({
            "dry_run": true,
            "request": request,
        }))
    }
}

/// Renders a JSON scalar the way callers serialize context values.
/// Nulls are dropped; arrays and objects are rejected.
pub(crate) fn scalar_string(key: &str, value: &Value) -> Result<Option<String>, TribunalError> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Array(_) | Value::Object(_) => Err(TribunalError::ValidationError(format!(
            "governance override '{}' must be a scalar",
            key
        ))),
    }
}

pub(crate) fn apply_overrides(
    ctx: &mut Context,
    overrides: Option<&Map<String, Value>>,
) -> Result<(), TribunalError> {
    for (key, value) in overrides.into_iter().flatten() {
        if let Some(s) = scalar_string(key, value)? {
            ctx.set(key.clone(), s);
        }
    }
    Ok(())
}

/// Numeric value of a request field. Missing, null, zero and empty all count
/// as absent so the next source can be tried.
fn amount(section: Option<&Map<String, Value>>, key: &str) -> Result<Option<f64>, TribunalError> {
    let Some(value) = section.and_then(|s| s.get(key)) else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.trim().parse::<f64>().map_err(|_| {
            TribunalError::ValidationError(format!("'{}' is not a number: {:?}", key, s))
        })?),
        other => {
            return Err(TribunalError::ValidationError(format!(
                "'{}' is not a number: {}",
                key, other
            )));
        }
    };
    Ok(parsed.filter(|v| v.is_finite() && *v != 0.0))
}

impl DealPipelineRequest {
    /// Builds the `deal` context: money fields from underwriting (falling
    /// back to the deal), moderate defaults for everything else, then the
    /// explicit governance overrides.
    pub fn build_context(&self) -> Result<Context, TribunalError> {
        let uw = self.underwriting.as_ref();
        let deal = self.deal.as_ref();

        let price = match amount(uw, "purchase_price")? {
            Some(p) => Some(p),
            None => amount(deal, "price")?,
        };
        let repairs = match amount(uw, "repairs")? {
            Some(r) => Some(r),
            None => amount(deal, "repairs")?,
        }
        .unwrap_or(0.0);
        let arv = match amount(uw, "arv")? {
            Some(a) => Some(a),
            None => amount(deal, "arv")?,
        };
        let roi = match (price, arv) {
            (Some(p), Some(a)) => (a - p - repairs) / p,
            _ => 0.0,
        };
        let exposure = price.unwrap_or(0.0);

        let mut ctx = Context::new(CONTEXT_TYPE)
            .with("purchase_price", price.unwrap_or(0.0))
            .with("repairs", repairs)
            .with("arv", arv.unwrap_or(0.0))
            .with("roi", roi)
            .with("predatory", false)
            .with("hours_per_week", 40)
            .with("parallel_projects", 1)
            .with("uses_evenings", false)
            .with("uses_weekends", false)
            .with("sprint_weeks", 4)
            .with("stress_level", 6)
            .with("chaos_factor", 4.0)
            .with("active_verticals", 1)
            .with("new_verticals", 0)
            .with("estimated_annual_profit", 150_000)
            .with("complexity_score", 5)
            .with("time_to_break_even_months", 12)
            .with("mission_critical", true)
            .with("distraction_score", 2)
            .with("capital_at_risk", exposure)
            .with("worst_case_loss", exposure)
            .with("probability_of_ruin", 0.02)
            .with("correlation_with_portfolio", 0.5)
            .with("hidden_complexity_score", 5);
        for flag in LEGAL_FLAGS {
            ctx.set(*flag, false);
        }
        apply_overrides(&mut ctx, self.governance.as_ref())?;
        Ok(ctx)
    }
}

pub(crate) const LEGAL_FLAGS: &[&str] = &[
    "requires_license_without_having_it",
    "tax_evasion",
    "fraudulent_misrepresentation",
    "recording_without_consent",
    "exploits_vulnerable",
    "misleading_marketing",
    "missing_disclosures",
];

/// Evaluates the request with the full panel and runs the pipeline only on
/// approval. The runner's output comes back with `_governance` attached.
pub fn run_gated_pipeline(
    gate: &Gate,
    runner: &dyn PipelineRunner,
    request: &DealPipelineRequest,
) -> Result<Value, TribunalError> {
    let ctx = request.build_context()?;
    let guarded = gate.guard(&ctx, None, |_| {
        runner.run(request).map_err(|e| match e {
            TribunalError::CollaboratorFailure(_) => e,
            other => TribunalError::CollaboratorFailure(format!("deal pipeline failed: {}", other)),
        })
    })?;

    match guarded {
        Guarded::Denied(decision) => {
            info!(blocked_by = ?decision.blocked_by, "deal pipeline blocked");
            Err(TribunalError::GovernanceBlocked {
                message: BLOCKED_MESSAGE.to_string(),
                governance: Box::new(decision),
            })
        }
        Guarded::Proceeded { governance, output } => {
            let snapshot = serde_json::to_value(&governance)?;
            Ok(match output {
                Value::Object(mut map) => {
                    map.insert("_governance".to_string(), snapshot);
                    Value::Object(map)
                }
                other => serde_json::json!({ "result": other, "_governance": snapshot }),
            })
        }
    }
}

pub fn run_pipeline_cli(gate: &Gate, cli: PipelineCli) -> Result<(), TribunalError> {
    let raw = fs::read_to_string(&cli.json)?;
    let request: DealPipelineRequest = serde_json::from_str(&raw)?;
    let outcome = run_gated_pipeline(gate, &DryRunPipeline, &request);

    match (&outcome, cli.format.as_str()) {
        (Ok(value), "json") => {
            let env = time::command_envelope(
                "gate.pipeline",
                "approved",
                serde_json::json!({ "result": value }),
            );
            println!("{}", serde_json::to_string_pretty(&env)?);
        }
        (Ok(value), _) => {
            if let Some(gov) = value.get("_governance") {
                let decision = serde_json::from_value(gov.clone())?;
                println!("{}", output::render_aggregate(&decision));
            }
            println!("Pipeline handed off (dry run).");
        }
        (Err(TribunalError::GovernanceBlocked { message, governance }), "json") => {
            let env = time::command_envelope(
                "gate.pipeline",
                "blocked",
                serde_json::json!({ "message": message, "governance": governance }),
            );
            println!("{}", serde_json::to_string_pretty(&env)?);
        }
        (Err(TribunalError::GovernanceBlocked { governance, .. }), _) => {
            println!("{}", output::render_aggregate(governance));
        }
        _ => {}
    }
    outcome.map(|_| ())
}

pub fn schema() -> Value {
    serde_json::json!({
        "name": "pipeline",
        "version": "0.1.0",
        "description": "Deal pipeline gated by the full evaluator panel",
        "context_type": CONTEXT_TYPE,
        "commands": [
            { "name": "gate pipeline", "parameters": ["json", "format"] }
        ],
        "request": ["deal", "underwriting", "governance", "..."],
        "errors": { "blocked": 409, "runner_failure": 500 }
    })
}

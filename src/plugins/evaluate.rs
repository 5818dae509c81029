//! `tribunal evaluate`: one-off evaluation of an ad hoc context.
//!
//! Goes through the gate, so the decision is recorded like any other.

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::context::Context;
use crate::core::decision::AggregateDecision;
use crate::core::error::TribunalError;
use crate::core::gate::Gate;
use crate::core::output;
use crate::core::time;
use crate::plugins::policy::load_json_arg;

#[derive(Parser, Debug)]
#[clap(name = "evaluate", about = "Evaluate a context against the evaluator panel")]
pub struct EvaluateCli {
    /// Context type label, e.g. 'deal' or 'new_vertical'.
    #[clap(long = "type")]
    pub context_type: Option<String>,
    /// Context value as key=value; repeatable.
    #[clap(long = "set", value_parser = parse_key_val)]
    pub set: Vec<(String, String)>,
    /// Evaluator to run; repeatable. Defaults to the configured panel.
    #[clap(long = "evaluator")]
    pub evaluators: Vec<String>,
    /// Evaluate request as inline JSON or a JSON file; flags override it.
    #[clap(long)]
    pub json: Option<String>,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (k, v) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
    let k = k.trim();
    if k.is_empty() {
        return Err(format!("empty key in '{}'", s));
    }
    Ok((k.to_string(), v.to_string()))
}

/// Wire shape of an evaluate call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluateRequest {
    #[serde(default)]
    pub context_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub evaluators: Option<Vec<String>>,
}

impl EvaluateRequest {
    pub fn context(&self) -> Context {
        Context {
            context_type: self.context_type.clone(),
            data: self.data.clone(),
        }
    }
}

pub fn evaluate_request(
    gate: &Gate,
    request: &EvaluateRequest,
) -> Result<AggregateDecision, TribunalError> {
    Ok(gate
        .check(&request.context(), request.evaluators.as_deref())?
        .into_decision())
}

fn request_from_cli(cli: &EvaluateCli) -> Result<EvaluateRequest, TribunalError> {
    let mut request: EvaluateRequest = match &cli.json {
        Some(arg) => serde_json::from_value(load_json_arg(arg)?)?,
        None => EvaluateRequest::default(),
    };
    if let Some(t) = &cli.context_type {
        request.context_type = t.clone();
    }
    if request.context_type.trim().is_empty() {
        request.context_type = "generic".to_string();
    }
    for (k, v) in &cli.set {
        request.data.insert(k.clone(), v.clone());
    }
    if !cli.evaluators.is_empty() {
        request.evaluators = Some(cli.evaluators.clone());
    }
    Ok(request)
}

pub fn run_evaluate_cli(gate: &Gate, cli: EvaluateCli) -> Result<(), TribunalError> {
    let request = request_from_cli(&cli)?;
    let decision = evaluate_request(gate, &request)?;
    if cli.format == "json" {
        let status = if decision.overall_allowed { "allowed" } else { "denied" };
        let env = time::command_envelope("evaluate", status, serde_json::to_value(&decision)?);
        println!("{}", serde_json::to_string_pretty(&env)?);
    } else {
        println!("{}", output::render_aggregate(&decision));
    }
    Ok(())
}

pub fn schema() -> Value {
    serde_json::json!({
        "name": "evaluate",
        "version": "0.1.0",
        "description": "Run a context through the evaluator panel and aggregate the verdicts",
        "commands": [
            { "name": "evaluate", "parameters": ["type", "set", "evaluator", "json", "format"] }
        ],
        "request": { "context_type": "string", "data": "map<string,string>", "evaluators": "list<string>?" },
        "response": ["overall_allowed", "worst_severity", "blocked_by", "checks", "summary"]
    })
}

use crate::core::error;
use crate::core::orchestrator::Orchestrator;
use crate::core::policy::PolicyPatch;
use crate::core::schemas;
use crate::core::time;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::Path;

#[derive(Parser, Debug)]
#[clap(name = "policy", about = "Inspect and patch evaluator policies")]
pub struct PolicyCli {
    #[clap(subcommand)]
    pub command: PolicyCommand,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text", global = true)]
    pub format: String,
}

#[derive(Subcommand, Debug)]
pub enum PolicyCommand {
    /// List every evaluator's current policy.
    List,
    /// Show one evaluator's policy.
    Get { name: String },
    /// Deep-merge a partial body into one evaluator's policy.
    Patch {
        name: String,
        /// Inline JSON object, or a path to a file holding one.
        #[clap(long)]
        json: String,
        /// Refuse the patch unless the stored policy is at this version.
        #[clap(long)]
        expected_version: Option<u64>,
        #[clap(long, default_value = "operator")]
        actor: String,
    },
    /// Committed patches for one evaluator, oldest first.
    History { name: String },
}

/// Reads `arg` as inline JSON when it looks like an object, otherwise as a
/// path to a JSON file.
pub fn load_json_arg(arg: &str) -> Result<Value, error::TribunalError> {
    let trimmed = arg.trim_start();
    if trimmed.starts_with('{') {
        return Ok(serde_json::from_str(trimmed)?);
    }
    let path = Path::new(arg);
    if !path.is_file() {
        return Err(error::TribunalError::NotFound(format!(
            "JSON file {}",
            path.display()
        )));
    }
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}

fn emit(format: &str, cmd: &str, payload: Value, text: impl FnOnce() -> String) {
    if format == "json" {
        let env = time::command_envelope(cmd, "ok", payload);
        println!(
            "{}",
            serde_json::to_string_pretty(&env).unwrap_or_else(|_| env.to_string())
        );
    } else {
        println!("{}", text());
    }
}

pub fn run_policy_cli(
    orchestrator: &Orchestrator,
    cli: PolicyCli,
) -> Result<(), error::TribunalError> {
    let format = cli.format.as_str();
    match cli.command {
        PolicyCommand::List => {
            let policies = orchestrator.list_policies()?;
            emit(
                format,
                "policy.list",
                serde_json::json!({ "policies": policies }),
                || {
                    policies
                        .values()
                        .map(|p| {
                            format!(
                                "{} {} (updated {})",
                                p.evaluator.bold(),
                                format!("v{}", p.version).cyan(),
                                p.updated_at
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            );
        }
        PolicyCommand::Get { name } => {
            let record = orchestrator.get_policy(&name)?;
            emit(
                format,
                "policy.get",
                serde_json::json!({ "policy": record }),
                || {
                    format!(
                        "{} {}\n{}",
                        record.evaluator.bold(),
                        format!("v{}", record.version).cyan(),
                        serde_json::to_string_pretty(&record.body).unwrap_or_default()
                    )
                },
            );
        }
        PolicyCommand::Patch {
            name,
            json,
            expected_version,
            actor,
        } => {
            let mut patch = PolicyPatch::new(load_json_arg(&json)?).by(actor);
            if let Some(v) = expected_version {
                patch = patch.expecting(v);
            }
            let record = orchestrator.patch_policy(&name, &patch)?;
            emit(
                format,
                "policy.patch",
                serde_json::json!({ "policy": record }),
                || {
                    format!(
                        "Policy {} updated to {}.",
                        record.evaluator.bold(),
                        format!("v{}", record.version).green()
                    )
                },
            );
        }
        PolicyCommand::History { name } => {
            let revisions = orchestrator.policy_history(&name)?;
            emit(
                format,
                "policy.history",
                serde_json::json!({ "evaluator": name, "revisions": revisions }),
                || {
                    if revisions.is_empty() {
                        return format!("No patches recorded for {}.", name);
                    }
                    revisions
                        .iter()
                        .map(|r| format!("v{} {} by {}: {}", r.version, r.ts, r.actor, r.patch))
                        .collect::<Vec<_>>()
                        .join("\n")
                },
            );
        }
    }
    Ok(())
}

pub fn schema() -> Value {
    serde_json::json!({
        "name": "policy",
        "version": "0.1.0",
        "description": "Per-evaluator threshold sets with versioned partial patches",
        "commands": [
            { "name": "list", "parameters": [] },
            { "name": "get", "parameters": ["name"] },
            { "name": "patch", "parameters": ["name", "json", "expected_version", "actor"] },
            { "name": "history", "parameters": ["name"] }
        ],
        "storage": [schemas::GOVERNANCE_DB_NAME]
    })
}

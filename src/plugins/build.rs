//! Governance-gated autonomous build requests.
//!
//! The panel judges a `build_request` context first. Only an approved request
//! is forwarded to the task sink, and the sink's answer never changes the
//! verdict: an approved request whose task could not be created is still
//! `accepted`, just with `task_created = false`.
//!
//! Per-call state machine:
//!
//! ```text
//! Received -> Evaluating -> Denied
//!                        -> Approved -> Delegating -> Delegated
//!                                                  -> DelegationFailed
//! ```

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::core::context::Context;
use crate::core::decision::AggregateDecision;
use crate::core::error::TribunalError;
use crate::core::gate::{Gate, GateVerdict};
use crate::core::output;
use crate::core::time;
use crate::plugins::pipeline::{LEGAL_FLAGS, apply_overrides};

pub const CONTEXT_TYPE: &str = "build_request";

#[derive(Parser, Debug)]
#[clap(name = "build", about = "Submit an autonomous build request through the governance gate")]
pub struct BuildCli {
    /// Path to the build request (JSON).
    #[clap(long)]
    pub json: PathBuf,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    pub format: String,
}

/// What an automated builder may touch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildScope {
    /// Directories the builder may modify, relative to the project root.
    pub target_dirs: Vec<String>,
    pub max_files: i64,
    pub allow_migrations: bool,
    pub allow_new_routes: bool,
    pub allow_schema_changes: bool,
}

impl Default for BuildScope {
    fn default() -> Self {
        Self {
            target_dirs: Vec::new(),
            max_files: 10,
            allow_migrations: false,
            allow_new_routes: true,
            allow_schema_changes: false,
        }
    }
}

fn five() -> i64 {
    5
}

fn eight() -> i64 {
    8
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildRequest {
    pub title: String,
    pub description: String,
    /// Business vertical the build supports.
    pub vertical: String,
    /// 1-10.
    #[serde(default = "five")]
    pub priority: i64,
    #[serde(default = "eight")]
    pub estimated_hours: i64,
    /// 1-10.
    #[serde(default = "five")]
    pub complexity_score: i64,
    #[serde(default)]
    pub estimated_annual_profit_impact: i64,
    /// 1-10.
    #[serde(default = "five")]
    pub strategic_importance: i64,
    #[serde(default)]
    pub is_core_infrastructure: bool,
    #[serde(default)]
    pub touches_financial_flows: bool,
    #[serde(default)]
    pub touches_legal_contracts: bool,
    #[serde(default)]
    pub experimental_only: bool,
    /// Raw context overrides for advanced callers.
    #[serde(default)]
    pub governance_flags: Map<String, Value>,
    #[serde(default)]
    pub scope: BuildScope,
}

fn in_range(field: &str, value: i64, lo: i64, hi: i64) -> Result<(), TribunalError> {
    if (lo..=hi).contains(&value) {
        Ok(())
    } else {
        Err(TribunalError::ValidationError(format!(
            "{} must lie in {}..={}, got {}",
            field, lo, hi, value
        )))
    }
}

impl BuildRequest {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        vertical: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            vertical: vertical.into(),
            priority: 5,
            estimated_hours: 8,
            complexity_score: 5,
            estimated_annual_profit_impact: 0,
            strategic_importance: 5,
            is_core_infrastructure: false,
            touches_financial_flows: false,
            touches_legal_contracts: false,
            experimental_only: false,
            governance_flags: Map::new(),
            scope: BuildScope::default(),
        }
    }

    pub fn validate(&self) -> Result<(), TribunalError> {
        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("vertical", &self.vertical),
        ] {
            if value.trim().is_empty() {
                return Err(TribunalError::ValidationError(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }
        in_range("priority", self.priority, 1, 10)?;
        in_range("complexity_score", self.complexity_score, 1, 10)?;
        in_range("strategic_importance", self.strategic_importance, 1, 10)?;
        if self.estimated_hours < 0 {
            return Err(TribunalError::ValidationError(
                "estimated_hours must not be negative".to_string(),
            ));
        }
        if self.scope.max_files < 0 {
            return Err(TribunalError::ValidationError(
                "scope.max_files must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Strategic measures come from the request itself; no money changes
    /// hands in a build, so financial and downside inputs default to zero.
    pub fn build_context(&self) -> Result<Context, TribunalError> {
        let importance = self.strategic_importance;
        let mut ctx = Context::new(CONTEXT_TYPE)
            .with("active_verticals", 1)
            .with("new_verticals", 0)
            .with("estimated_annual_profit", self.estimated_annual_profit_impact)
            .with("complexity_score", self.complexity_score)
            .with("time_to_break_even_months", 12)
            .with("mission_critical", importance >= 7)
            .with("distraction_score", if importance >= 5 { 2 } else { 7 })
            .with("hours_per_week", 40)
            .with("parallel_projects", 1)
            .with("uses_evenings", false)
            .with("uses_weekends", false)
            .with("sprint_weeks", 4)
            .with("stress_level", 6)
            .with("chaos_factor", 4.0)
            .with("capital_at_risk", 0)
            .with("worst_case_loss", 0)
            .with("probability_of_ruin", 0.01)
            .with("correlation_with_portfolio", 0.6)
            .with("hidden_complexity_score", self.complexity_score)
            .with("purchase_price", 0)
            .with("repairs", 0)
            .with("arv", 0)
            .with("roi", 0)
            .with("predatory", false);
        for flag in LEGAL_FLAGS {
            ctx.set(*flag, false);
        }
        apply_overrides(&mut ctx, Some(&self.governance_flags))?;
        Ok(ctx)
    }

    pub fn to_task(&self) -> BuildTask {
        BuildTask {
            title: self.title.clone(),
            description: self.description.clone(),
            priority: self.priority,
            vertical: self.vertical.clone(),
            metadata: BuildTaskMetadata {
                estimated_hours: self.estimated_hours,
                complexity_score: self.complexity_score,
                estimated_annual_profit_impact: self.estimated_annual_profit_impact,
                strategic_importance: self.strategic_importance,
                scope: self.scope.clone(),
            },
        }
    }
}

/// Work item handed to the task sink after approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTask {
    pub title: String,
    pub description: String,
    pub priority: i64,
    pub vertical: String,
    pub metadata: BuildTaskMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildTaskMetadata {
    pub estimated_hours: i64,
    pub complexity_score: i64,
    pub estimated_annual_profit_impact: i64,
    pub strategic_importance: i64,
    pub scope: BuildScope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReceipt {
    pub task_id: String,
    /// Whatever the sink reported back.
    #[serde(default)]
    pub raw: Value,
}

/// Outcome of handing a task to the sink. Not an error type: an unavailable
/// sink is an expected, reportable state.
#[derive(Debug, Clone, PartialEq)]
pub enum Delegation {
    Created(TaskReceipt),
    Unavailable(String),
}

pub trait TaskSink: Send + Sync {
    fn create_task(&self, task: &BuildTask) -> Delegation;
}

/// No builder configured.
pub struct NoTaskSink;

impl TaskSink for NoTaskSink {
    fn create_task(&self, _task: &BuildTask) -> Delegation {
        Delegation::Unavailable("no task sink configured".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub task_id: String,
    pub ts: String,
    pub status: String,
    pub task: BuildTask,
}

/// Local queue: one JSON line per task in `build_tasks.jsonl`.
pub struct TaskQueue {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TaskQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn enqueue(&self, task: &BuildTask) -> Result<QueuedTask, TribunalError> {
        let queued = QueuedTask {
            task_id: time::new_event_id(),
            ts: time::now_epoch_z(),
            status: "queued".to_string(),
            task: task.clone(),
        };
        let line = serde_json::to_string(&queued)?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", line)?;
        Ok(queued)
    }

    pub fn read_all(&self) -> Result<Vec<QueuedTask>, TribunalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        fs::read_to_string(&self.path)?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| serde_json::from_str(l).map_err(TribunalError::from))
            .collect()
    }
}

impl TaskSink for TaskQueue {
    fn create_task(&self, task: &BuildTask) -> Delegation {
        match self.enqueue(task) {
            Ok(queued) => {
                let raw = serde_json::to_value(&queued).unwrap_or(Value::Null);
                Delegation::Created(TaskReceipt {
                    task_id: queued.task_id,
                    raw,
                })
            }
            Err(e) => Delegation::Unavailable(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildState {
    Received,
    Evaluating,
    Denied,
    Approved,
    Delegating,
    Delegated,
    /// Terminal; governance still approved.
    DelegationFailed,
}

impl BuildState {
    pub fn successors(self) -> &'static [BuildState] {
        use BuildState::*;
        match self {
            Received => &[Evaluating],
            Evaluating => &[Denied, Approved],
            Approved => &[Delegating],
            Delegating => &[Delegated, DelegationFailed],
            Denied | Delegated | DelegationFailed => &[],
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// True for every state reachable only through approval.
    pub fn is_approved(self) -> bool {
        matches!(
            self,
            BuildState::Approved
                | BuildState::Delegating
                | BuildState::Delegated
                | BuildState::DelegationFailed
        )
    }
}

/// States visited by one request, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trail(Vec<BuildState>);

impl Trail {
    fn start() -> Self {
        Self(vec![BuildState::Received])
    }

    fn advance(&mut self, next: BuildState) {
        let current = self.current();
        debug_assert!(
            current.successors().contains(&next),
            "illegal build state transition {:?} -> {:?}",
            current,
            next
        );
        self.0.push(next);
    }

    pub fn current(&self) -> BuildState {
        self.0.last().copied().unwrap_or(BuildState::Received)
    }

    pub fn states(&self) -> &[BuildState] {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildResponse {
    /// Governance verdict; independent of task creation.
    pub accepted: bool,
    pub state: BuildState,
    pub trail: Trail,
    pub governance: AggregateDecision,
    pub task_created: bool,
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_response: Option<Value>,
    pub message: String,
}

/// Validates, evaluates with the full panel and, on approval, delegates to
/// `sink`. Only input and evaluation problems are errors; an unavailable sink
/// is reported in the response.
pub fn submit_build_request(
    gate: &Gate,
    sink: &dyn TaskSink,
    request: &BuildRequest,
) -> Result<BuildResponse, TribunalError> {
    let mut trail = Trail::start();
    request.validate()?;
    let ctx = request.build_context()?;

    trail.advance(BuildState::Evaluating);
    let governance = match gate.check(&ctx, None)? {
        GateVerdict::Denied(decision) => {
            trail.advance(BuildState::Denied);
            info!(title = %request.title, blocked_by = ?decision.blocked_by, "build request denied");
            return Ok(BuildResponse {
                accepted: false,
                state: trail.current(),
                trail,
                governance: decision,
                task_created: false,
                task_id: None,
                task_response: None,
                message: "Governance blocked this build request.".to_string(),
            });
        }
        GateVerdict::Approved(decision) => decision,
    };

    trail.advance(BuildState::Approved);
    trail.advance(BuildState::Delegating);
    let (task_id, task_response, message) = match sink.create_task(&request.to_task()) {
        Delegation::Created(receipt) => {
            trail.advance(BuildState::Delegated);
            info!(title = %request.title, task_id = %receipt.task_id, "build task created");
            (
                Some(receipt.task_id),
                Some(receipt.raw),
                "Governance approved and build task created.".to_string(),
            )
        }
        Delegation::Unavailable(reason) => {
            trail.advance(BuildState::DelegationFailed);
            warn!(title = %request.title, %reason, "build approved but task not created");
            (
                None,
                None,
                format!(
                    "Governance approved, but the build task could not be created: {}",
                    reason
                ),
            )
        }
    };

    Ok(BuildResponse {
        accepted: true,
        state: trail.current(),
        trail,
        governance,
        task_created: task_id.is_some(),
        task_id,
        task_response,
        message,
    })
}

pub fn run_build_cli(gate: &Gate, sink: &dyn TaskSink, cli: BuildCli) -> Result<(), TribunalError> {
    let raw = fs::read_to_string(&cli.json)?;
    let request: BuildRequest = serde_json::from_str(&raw)?;
    let response = submit_build_request(gate, sink, &request)?;

    if cli.format == "json" {
        let status = if response.accepted { "accepted" } else { "denied" };
        let env = time::command_envelope(
            "gate.build",
            status,
            serde_json::to_value(&response)?,
        );
        println!("{}", serde_json::to_string_pretty(&env)?);
    } else {
        println!("{}", output::render_aggregate(&response.governance));
        println!("{}", response.message);
        if let Some(id) = &response.task_id {
            println!("Task: {}", id);
        }
    }
    Ok(())
}

pub fn schema() -> Value {
    serde_json::json!({
        "name": "build",
        "version": "0.1.0",
        "description": "Autonomous build requests gated by the full evaluator panel",
        "context_type": CONTEXT_TYPE,
        "commands": [
            { "name": "gate build", "parameters": ["json", "format"] }
        ],
        "states": ["RECEIVED", "EVALUATING", "DENIED", "APPROVED", "DELEGATING", "DELEGATED", "DELEGATION_FAILED"],
        "storage": [crate::core::schemas::TASK_QUEUE_NAME]
    })
}

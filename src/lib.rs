//! Tribunal: a local-first governance gate.
//!
//! Consequential actions (a deal pipeline run, an autonomous build) pass
//! through a panel of independent evaluators before they happen. Each
//! evaluator judges one axis against its own patchable policy; the
//! orchestrator folds their decisions into one aggregate verdict, and the
//! gate refuses to run the protected action unless that verdict allows it.
//!
//! # Architecture
//!
//! - **Evaluators** are pure: typed context and policy in, `Decision` out.
//! - **Policy store** holds one versioned threshold set per evaluator.
//!   Patches are compare-and-swap; every database operation goes through
//!   `DbBroker` and leaves a line in `broker.events.jsonl`.
//! - **Orchestrator** runs the requested panel in order and aggregates:
//!   `overall_allowed` is true exactly when no check is a deny-and-critical.
//! - **Gate** records each aggregate in `decisions.events.jsonl` (best
//!   effort) and only then lets the caller act.
//!
//! # Examples
//!
//! ```bash
//! # Judge an ad hoc context
//! tribunal evaluate --type deal --set purchase_price=100000 --set arv=150000
//!
//! # Tighten one threshold
//! tribunal policy patch financial --json '{"risk": {"min_expected_roi": 0.15}}'
//!
//! # Gate a build request
//! tribunal gate build --json request.json
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: engine, store, broker, config and shared primitives
//! - [`plugins`]: the standard evaluators, the gated call sites, command groups

pub mod core;
pub mod plugins;

use crate::core::{
    config::TribunalConfig,
    decision_log::{DecisionLog, DisabledDecisionLog, JsonlDecisionLog},
    error,
    gate::Gate,
    orchestrator::Orchestrator,
    output,
    policy_store::{MemoryPolicyStore, PolicyStore, SqlitePolicyStore},
    store::{Store, StoreBackend},
    time,
};
use crate::plugins::{build, evaluate, pipeline, policy};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use tracing::debug;

#[derive(Parser, Debug)]
#[clap(
    name = "tribunal",
    version = env!("CARGO_PKG_VERSION"),
    about = "Governance gate for consequential actions"
)]
struct Cli {
    /// Store root; overrides TRIBUNAL_HOME and the config file.
    #[clap(long, global = true)]
    home: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a context against the evaluator panel.
    Evaluate(evaluate::EvaluateCli),
    /// Inspect and patch evaluator policies.
    Policy(policy::PolicyCli),
    /// Run a protected action through the gate.
    Gate(GateCli),
    /// Show recent decisions from the decision log.
    Log(LogCli),
    /// List registered evaluators and the context fields they read.
    Evaluators {
        /// Output format: 'text' or 'json'.
        #[clap(long, default_value = "text")]
        format: String,
    },
    /// Print JSON descriptors of every subsystem.
    Schema(SchemaCli),
}

#[derive(clap::Args, Debug)]
struct GateCli {
    #[clap(subcommand)]
    command: GateCommand,
}

#[derive(Subcommand, Debug)]
enum GateCommand {
    /// Deal pipeline request.
    Pipeline(pipeline::PipelineCli),
    /// Autonomous build request.
    Build(build::BuildCli),
}

#[derive(clap::Args, Debug)]
struct LogCli {
    #[clap(long, default_value_t = 20)]
    limit: usize,
    /// Output format: 'text' or 'json'.
    #[clap(long, default_value = "text")]
    format: String,
}

#[derive(clap::Args, Debug)]
struct SchemaCli {
    /// Single subsystem to describe.
    #[clap(long)]
    subsystem: Option<String>,
}

/// A fully wired engine for one store root.
pub struct Tribunal {
    pub config: TribunalConfig,
    pub store: Store,
    pub gate: Gate,
    /// `None` when decision logging is switched off.
    pub decision_log: Option<Arc<JsonlDecisionLog>>,
    pub task_sink: Arc<dyn build::TaskSink>,
}

impl Tribunal {
    pub fn open(config: TribunalConfig) -> Result<Self, error::TribunalError> {
        let store = Store::open(&config.store.root, config.store.backend)?;
        let policies: Arc<dyn PolicyStore> = match store.backend {
            StoreBackend::Sqlite => Arc::new(SqlitePolicyStore::open(&store.root)?),
            StoreBackend::Memory => Arc::new(MemoryPolicyStore::new()),
        };
        let registry = plugins::standard_registry()?;
        if !config.gate.default_evaluators.is_empty() {
            registry.resolve(Some(config.gate.default_evaluators.as_slice()))?;
        }
        let orchestrator = Arc::new(Orchestrator::new(registry, policies)?);

        let decision_log = config
            .gate
            .decision_log
            .then(|| Arc::new(JsonlDecisionLog::new(store.decision_log_path())));
        let log: Arc<dyn DecisionLog> = match &decision_log {
            Some(l) => l.clone(),
            None => Arc::new(DisabledDecisionLog),
        };
        let gate = Gate::new(orchestrator, log)
            .with_default_evaluators(config.gate.default_evaluators.clone());

        let task_sink: Arc<dyn build::TaskSink> = if config.gate.task_queue {
            Arc::new(build::TaskQueue::new(store.task_queue_path()))
        } else {
            Arc::new(build::NoTaskSink)
        };

        debug!(root = %store.root.display(), backend = ?store.backend, "store opened");
        Ok(Self {
            config,
            store,
            gate,
            decision_log,
            task_sink,
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        self.gate.orchestrator()
    }
}

/// Installs the stderr subscriber once. `TRIBUNAL_LOG` wins over `filter`.
pub fn init_tracing(filter: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(crate::core::config::LOG_ENV)
            .or_else(|_| EnvFilter::try_new(filter))
            .unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true))
            .with(filter)
            .try_init();
    });
}

fn schemas() -> std::collections::BTreeMap<&'static str, serde_json::Value> {
    let mut schemas = std::collections::BTreeMap::new();
    schemas.insert("broker", crate::core::broker::schema());
    schemas.insert("evaluate", evaluate::schema());
    schemas.insert("policy", policy::schema());
    schemas.insert("pipeline", pipeline::schema());
    schemas.insert("build", build::schema());
    schemas
}

fn print_schema(cli: SchemaCli) -> Result<(), error::TribunalError> {
    let schemas = schemas();
    let output = match cli.subsystem {
        Some(sub) => schemas
            .get(sub.as_str())
            .cloned()
            .ok_or_else(|| error::TribunalError::NotFound(format!("subsystem '{}'", sub)))?,
        None => serde_json::json!({
            "schema_version": "1.0.0",
            "subsystems": schemas,
            "evaluators": plugins::standard_registry()?.infos(),
        }),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_evaluators(format: &str) -> Result<(), error::TribunalError> {
    let infos = plugins::standard_registry()?.infos();
    if format == "json" {
        let env = time::command_envelope(
            "evaluators",
            "ok",
            serde_json::json!({ "evaluators": infos }),
        );
        println!("{}", serde_json::to_string_pretty(&env)?);
        return Ok(());
    }
    for info in infos {
        println!("{}  {}", info.name.bold(), info.description);
        for f in info.fields {
            println!(
                "    {:<36} {:<8} default {:<8} {}",
                f.name, f.kind, f.default, f.doc
            );
        }
    }
    Ok(())
}

fn print_log(tribunal: &Tribunal, cli: LogCli) -> Result<(), error::TribunalError> {
    let Some(log) = &tribunal.decision_log else {
        println!("Decision log disabled ([gate] decision_log = false).");
        return Ok(());
    };
    let records = log.read_recent(cli.limit)?;
    if cli.format == "json" {
        let env = time::command_envelope("log", "ok", serde_json::json!({ "records": records }));
        println!("{}", serde_json::to_string_pretty(&env)?);
    } else if records.is_empty() {
        println!("No decisions recorded.");
    } else {
        for r in records {
            let verdict = if r.decision.overall_allowed {
                "allowed".green()
            } else {
                "denied".red()
            };
            println!(
                "{} {} {:<14} {} {}",
                r.ts,
                verdict,
                r.context_type,
                r.evaluators.join(","),
                output::compact_line(&r.decision.summary, 80)
            );
        }
    }
    Ok(())
}

pub fn run() -> Result<(), error::TribunalError> {
    let cli = Cli::parse();
    let cwd = std::env::current_dir()?;
    let config = TribunalConfig::load(&cwd, cli.home.as_deref())?;
    init_tracing(&config.log.filter);
    let open = || Tribunal::open(config);

    match cli.command {
        Command::Schema(schema_cli) => print_schema(schema_cli),
        Command::Evaluators { format } => print_evaluators(&format),
        Command::Evaluate(evaluate_cli) => {
            evaluate::run_evaluate_cli(&open()?.gate, evaluate_cli)
        }
        Command::Policy(policy_cli) => policy::run_policy_cli(open()?.orchestrator(), policy_cli),
        Command::Gate(gate_cli) => {
            let tribunal = open()?;
            match gate_cli.command {
                GateCommand::Pipeline(pipeline_cli) => {
                    pipeline::run_pipeline_cli(&tribunal.gate, pipeline_cli)
                }
                GateCommand::Build(build_cli) => {
                    build::run_build_cli(&tribunal.gate, tribunal.task_sink.as_ref(), build_cli)
                }
            }
        }
        Command::Log(log_cli) => print_log(&open()?, log_cli),
    }
}

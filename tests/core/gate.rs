use std::sync::{Arc, Mutex};

use serde_json::json;
use tempfile::tempdir;
use tribunal::Tribunal;
use tribunal::core::config::TribunalConfig;
use tribunal::core::context::Context;
use tribunal::core::decision_log::{DecisionLog, DecisionRecord, JsonlDecisionLog, Recorded};
use tribunal::core::error::TribunalError;
use tribunal::core::gate::{Gate, GateVerdict, Guarded};
use tribunal::core::orchestrator::Orchestrator;
use tribunal::core::policy::PolicyPatch;
use tribunal::core::policy_store::MemoryPolicyStore;
use tribunal::core::store::StoreBackend;
use tribunal::plugins;

fn orchestrator() -> Arc<Orchestrator> {
    Arc::new(
        Orchestrator::new(
            plugins::standard_registry().unwrap(),
            Arc::new(MemoryPolicyStore::new()),
        )
        .unwrap(),
    )
}

fn config_at(root: &std::path::Path, backend: StoreBackend) -> TribunalConfig {
    let mut config = TribunalConfig::default();
    config.store.root = root.to_path_buf();
    config.store.backend = backend;
    config
}

fn red_line() -> Context {
    Context::new("deal").with("tax_evasion", "true")
}

fn clean() -> Context {
    Context::new("deal")
        .with("estimated_annual_profit", 150000)
        .with("mission_critical", "true")
}

/// Remembers what it was asked to record; optionally refuses.
#[derive(Default)]
struct CapturingLog {
    seen: Mutex<Vec<DecisionRecord>>,
    refuse: bool,
}

impl DecisionLog for CapturingLog {
    fn record(&self, record: &DecisionRecord) -> Recorded {
        self.seen.lock().unwrap().push(record.clone());
        if self.refuse {
            Recorded::Unavailable("disk full".to_string())
        } else {
            Recorded::Stored {
                event_id: record.event_id.clone(),
            }
        }
    }
}

#[test]
fn test_gate_records_every_decision() {
    let log = Arc::new(CapturingLog::default());
    let gate = Gate::new(orchestrator(), log.clone());

    assert!(gate.check(&clean(), None).unwrap().is_approved());
    let verdict = gate.check(&red_line(), None).unwrap();
    assert!(matches!(verdict, GateVerdict::Denied(_)));

    let seen = log.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen[0].decision.overall_allowed);
    assert!(!seen[1].decision.overall_allowed);
    assert_eq!(seen[1].context_digest, red_line().digest());
    assert_eq!(seen[1].evaluators.len(), 5);
}

#[test]
fn test_log_failure_does_not_change_the_verdict() {
    let log = Arc::new(CapturingLog {
        refuse: true,
        ..Default::default()
    });
    let gate = Gate::new(orchestrator(), log.clone());
    assert!(gate.check(&clean(), None).unwrap().is_approved());
    assert!(!gate.check(&red_line(), None).unwrap().is_approved());
    assert_eq!(log.seen.lock().unwrap().len(), 2);
}

#[test]
fn test_evaluation_error_is_not_recorded_and_does_not_open() {
    let log = Arc::new(CapturingLog::default());
    let gate = Gate::new(orchestrator(), log.clone());
    let ctx = Context::new("deal").with("stress_level", "high");
    let mut ran = false;
    let err = gate
        .guard(&ctx, None, |_| {
            ran = true;
            Ok(())
        })
        .unwrap_err();
    assert!(err.is_input_validation());
    assert!(!ran);
    assert!(log.seen.lock().unwrap().is_empty());
}

#[test]
fn test_guard_hands_the_approving_aggregate_to_the_action() {
    let gate = Gate::unlogged(orchestrator());
    let outcome = gate
        .guard(&clean(), None, |governance| Ok(governance.checks.len()))
        .unwrap();
    match outcome {
        Guarded::Proceeded { governance, output } => {
            assert!(governance.overall_allowed);
            assert_eq!(output, 5);
        }
        Guarded::Denied(d) => panic!("unexpected denial: {}", d.summary),
    }
}

#[test]
fn test_guard_returns_action_error_unchanged() {
    let gate = Gate::unlogged(orchestrator());
    let err = gate
        .guard(&clean(), None, |_| -> Result<(), TribunalError> {
            Err(TribunalError::CollaboratorFailure("queue offline".into()))
        })
        .unwrap_err();
    assert!(matches!(err, TribunalError::CollaboratorFailure(ref m) if m == "queue offline"));
}

#[test]
fn test_jsonl_log_reads_back_through_tribunal() {
    let tmp = tempdir().unwrap();
    let tribunal = Tribunal::open(config_at(tmp.path(), StoreBackend::Sqlite)).unwrap();
    tribunal.gate.check(&clean(), None).unwrap();
    tribunal
        .gate
        .check(&red_line(), Some(&["legal".to_string()][..]))
        .unwrap();

    let log = tribunal.decision_log.as_ref().unwrap();
    assert!(log.path().starts_with(&tribunal.store.root));
    let records = log.read_recent(10).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].evaluators, vec!["legal".to_string()]);
    assert_eq!(records[1].decision.blocked_by, vec!["legal".to_string()]);

    let last = log.read_recent(1).unwrap();
    assert_eq!(last, records[1..].to_vec());
}

#[test]
fn test_standalone_jsonl_log_appends() {
    let tmp = tempdir().unwrap();
    let log = Arc::new(JsonlDecisionLog::new(tmp.path().join("decisions.jsonl")));
    let gate = Gate::new(orchestrator(), log.clone());
    for _ in 0..3 {
        gate.check(&clean(), None).unwrap();
    }
    assert_eq!(log.read_recent(100).unwrap().len(), 3);
}

#[test]
fn test_disabled_decision_log_and_task_queue() {
    let tmp = tempdir().unwrap();
    let mut config = config_at(tmp.path(), StoreBackend::Memory);
    config.gate.decision_log = false;
    config.gate.task_queue = false;
    let tribunal = Tribunal::open(config).unwrap();
    assert!(tribunal.decision_log.is_none());
    assert!(tribunal.gate.check(&clean(), None).unwrap().is_approved());
    assert!(!tribunal.store.decision_log_path().exists());
}

#[test]
fn test_configured_default_panel_applies() {
    let tmp = tempdir().unwrap();
    let mut config = config_at(tmp.path(), StoreBackend::Memory);
    config.gate.default_evaluators = vec!["legal".to_string(), "capacity".to_string()];
    let tribunal = Tribunal::open(config).unwrap();
    let verdict = tribunal.gate.check(&clean(), None).unwrap();
    let names: Vec<&str> = verdict
        .decision()
        .checks
        .iter()
        .map(|c| c.evaluator.as_str())
        .collect();
    assert_eq!(names, vec!["legal", "capacity"]);
}

#[test]
fn test_unknown_default_evaluator_is_rejected_at_open() {
    let tmp = tempdir().unwrap();
    let mut config = config_at(tmp.path(), StoreBackend::Memory);
    config.gate.default_evaluators = vec!["oracle".to_string()];
    let err = Tribunal::open(config).err().unwrap();
    assert!(matches!(err, TribunalError::UnknownEvaluator(_)));
}

#[test]
fn test_sqlite_patch_survives_reopen() {
    let tmp = tempdir().unwrap();
    {
        let tribunal = Tribunal::open(config_at(tmp.path(), StoreBackend::Sqlite)).unwrap();
        tribunal
            .orchestrator()
            .patch_policy(
                "legal",
                &PolicyPatch::new(json!({"legal": {"forbid_tax_evasion": false}})),
            )
            .unwrap();
    }
    let tribunal = Tribunal::open(config_at(tmp.path(), StoreBackend::Sqlite)).unwrap();
    assert_eq!(tribunal.orchestrator().get_policy("legal").unwrap().version, 2);
    let verdict = tribunal
        .gate
        .check(&red_line(), Some(&["legal".to_string()][..]))
        .unwrap();
    assert!(verdict.is_approved());
}

#[test]
fn test_config_file_is_picked_up_from_cwd() {
    let tmp = tempdir().unwrap();
    std::fs::write(
        tmp.path().join("tribunal.toml"),
        "[store]\nroot = \"state\"\nbackend = \"memory\"\n\n[gate]\ndefault_evaluators = [\"legal\"]\n",
    )
    .unwrap();
    let config = TribunalConfig::load_with(tmp.path(), None, |_| None).unwrap();
    assert_eq!(config.store.root, tmp.path().join("state"));
    assert_eq!(config.store.backend, StoreBackend::Memory);

    let tribunal = Tribunal::open(config).unwrap();
    assert!(tribunal.store.root.ends_with("state"));
    let verdict = tribunal.gate.check(&red_line(), None).unwrap();
    assert_eq!(verdict.decision().checks.len(), 1);
}

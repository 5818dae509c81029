use std::cell::Cell;
use std::sync::Arc;

use serde_json::{Value, json};
use tribunal::core::error::TribunalError;
use tribunal::core::gate::Gate;
use tribunal::core::orchestrator::Orchestrator;
use tribunal::core::policy_store::MemoryPolicyStore;
use tribunal::plugins;
use tribunal::plugins::pipeline::{
    BLOCKED_MESSAGE, DealPipelineRequest, DryRunPipeline, PipelineRunner, run_gated_pipeline,
};

fn gate() -> Gate {
    let orchestrator = Orchestrator::new(
        plugins::standard_registry().unwrap(),
        Arc::new(MemoryPolicyStore::new()),
    )
    .unwrap();
    Gate::unlogged(Arc::new(orchestrator))
}

fn request(body: Value) -> DealPipelineRequest {
    serde_json::from_value(body).unwrap()
}

fn sound_deal() -> DealPipelineRequest {
    request(json!({
        "deal": {"address": "12 Elm St", "price": 95000},
        "underwriting": {"purchase_price": 100000, "repairs": 20000, "arv": 150000},
        "seller": {"name": "Pat"}
    }))
}

/// Counts calls and echoes the address it was given.
struct CountingRunner {
    calls: Cell<u32>,
}

impl CountingRunner {
    fn new() -> Self {
        Self {
            calls: Cell::new(0),
        }
    }
}

impl PipelineRunner for CountingRunner {
    fn run(&self, request: &DealPipelineRequest) -> Result<Value, TribunalError> {
        self.calls.set(self.calls.get() + 1);
        let address = request
            .deal
            .as_ref()
            .and_then(|d| d.get("address"))
            .cloned()
            .unwrap_or(Value::Null);
        Ok(json!({"status": "underwritten", "address": address}))
    }
}

struct FailingRunner;

impl PipelineRunner for FailingRunner {
    fn run(&self, _request: &DealPipelineRequest) -> Result<Value, TribunalError> {
        Err(TribunalError::NotFound("comparable sales".into()))
    }
}

#[test]
fn test_approved_deal_runs_pipeline_with_governance_attached() {
    let runner = CountingRunner::new();
    let out = run_gated_pipeline(&gate(), &runner, &sound_deal()).unwrap();
    assert_eq!(runner.calls.get(), 1);
    assert_eq!(out["status"], "underwritten");
    assert_eq!(out["address"], "12 Elm St");

    let governance = &out["_governance"];
    assert_eq!(governance["overall_allowed"], true);
    // Moderate default workload sits on the preferred hours ceiling.
    assert_eq!(governance["worst_severity"], "warn");
    assert_eq!(governance["checks"].as_array().unwrap().len(), 5);
}

#[test]
fn test_underwriting_beats_deal_section() {
    let ctx = sound_deal().build_context().unwrap();
    assert_eq!(ctx.context_type, "deal");
    assert_eq!(ctx.data["purchase_price"], "100000");
    assert_eq!(ctx.data["capital_at_risk"], "100000");
    assert_eq!(ctx.data["roi"], "0.3");
}

#[test]
fn test_deal_section_is_the_fallback() {
    let req = request(json!({"deal": {"price": "80000", "arv": 120000}}));
    let ctx = req.build_context().unwrap();
    assert_eq!(ctx.data["purchase_price"], "80000");
    assert_eq!(ctx.data["repairs"], "0");
    assert_eq!(ctx.data["roi"], "0.5");
}

#[test]
fn test_non_numeric_amount_is_rejected_before_evaluation() {
    let runner = CountingRunner::new();
    let req = request(json!({"underwriting": {"purchase_price": "a lot"}}));
    let err = run_gated_pipeline(&gate(), &runner, &req).unwrap_err();
    assert!(err.is_input_validation());
    assert_eq!(runner.calls.get(), 0);
}

#[test]
fn test_blocked_deal_never_reaches_runner() {
    let runner = CountingRunner::new();
    let mut req = sound_deal();
    req.governance = Some(
        json!({"tax_evasion": true})
            .as_object()
            .cloned()
            .unwrap(),
    );
    let err = run_gated_pipeline(&gate(), &runner, &req).unwrap_err();
    assert_eq!(runner.calls.get(), 0);
    assert_eq!(err.status_code(), 409);
    match err {
        TribunalError::GovernanceBlocked {
            message,
            governance,
        } => {
            assert_eq!(message, BLOCKED_MESSAGE);
            assert!(!governance.overall_allowed);
            assert_eq!(governance.blocked_by, vec!["legal".to_string()]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_guaranteed_loss_blocks_on_financial() {
    let runner = CountingRunner::new();
    let req = request(json!({
        "underwriting": {"purchase_price": 200000, "repairs": 10000, "arv": 150000}
    }));
    let err = run_gated_pipeline(&gate(), &runner, &req).unwrap_err();
    let TribunalError::GovernanceBlocked { governance, .. } = err else {
        panic!("expected a governance block");
    };
    assert!(governance.blocked_by.contains(&"financial".to_string()));
    assert_eq!(runner.calls.get(), 0);
}

#[test]
fn test_override_can_lift_workload_defaults() {
    let mut req = sound_deal();
    req.governance = Some(
        json!({"hours_per_week": 20, "chaos_factor": null})
            .as_object()
            .cloned()
            .unwrap(),
    );
    let ctx = req.build_context().unwrap();
    assert_eq!(ctx.data["hours_per_week"], "20");
    // Null overrides leave the default in place.
    assert_eq!(ctx.data["chaos_factor"], "4");

    let out = run_gated_pipeline(&gate(), &CountingRunner::new(), &req).unwrap();
    assert_eq!(out["_governance"]["worst_severity"], "info");
}

#[test]
fn test_structured_override_is_rejected() {
    let mut req = sound_deal();
    req.governance = Some(json!({"tax_evasion": [true]}).as_object().cloned().unwrap());
    let err = req.build_context().unwrap_err();
    assert!(err.is_input_validation());
}

#[test]
fn test_runner_failure_is_a_collaborator_failure() {
    let err = run_gated_pipeline(&gate(), &FailingRunner, &sound_deal()).unwrap_err();
    assert!(matches!(err, TribunalError::CollaboratorFailure(ref m) if m.contains("comparable sales")));
    assert!(!err.is_input_validation());
}

#[test]
fn test_dry_run_echoes_unknown_sections() {
    let out = run_gated_pipeline(&gate(), &DryRunPipeline, &sound_deal()).unwrap();
    assert_eq!(out["dry_run"], true);
    assert_eq!(out["request"]["seller"]["name"], "Pat");
    assert!(out["_governance"].is_object());
}

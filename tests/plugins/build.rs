use std::sync::{Arc, Mutex};

use serde_json::{Value, json};
use tempfile::tempdir;
use tribunal::core::decision::Severity;
use tribunal::core::gate::Gate;
use tribunal::core::orchestrator::Orchestrator;
use tribunal::core::policy_store::MemoryPolicyStore;
use tribunal::plugins;
use tribunal::plugins::build::{
    BuildRequest, BuildState, BuildTask, Delegation, NoTaskSink, TaskQueue, TaskReceipt, TaskSink,
    submit_build_request,
};

fn gate() -> Gate {
    let orchestrator = Orchestrator::new(
        plugins::standard_registry().unwrap(),
        Arc::new(MemoryPolicyStore::new()),
    )
    .unwrap();
    Gate::unlogged(Arc::new(orchestrator))
}

fn dashboard() -> BuildRequest {
    let mut req = BuildRequest::new(
        "Deal dashboard",
        "Pipeline overview page for active deals",
        "real_estate",
    );
    req.estimated_hours = 12;
    req
}

/// Sink that remembers every task it was handed.
#[derive(Default)]
struct RecordingSink {
    tasks: Mutex<Vec<BuildTask>>,
}

impl TaskSink for RecordingSink {
    fn create_task(&self, task: &BuildTask) -> Delegation {
        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(task.clone());
        Delegation::Created(TaskReceipt {
            task_id: format!("task-{}", tasks.len()),
            raw: json!({"ok": true}),
        })
    }
}

#[test]
fn test_approved_request_is_delegated() {
    let sink = RecordingSink::default();
    let resp = submit_build_request(&gate(), &sink, &dashboard()).unwrap();

    assert!(resp.accepted);
    assert!(resp.task_created);
    assert_eq!(resp.task_id.as_deref(), Some("task-1"));
    assert_eq!(resp.task_response, Some(json!({"ok": true})));
    assert_eq!(resp.state, BuildState::Delegated);
    assert_eq!(
        resp.trail.states(),
        &[
            BuildState::Received,
            BuildState::Evaluating,
            BuildState::Approved,
            BuildState::Delegating,
            BuildState::Delegated
        ]
    );
    assert_eq!(resp.message, "Governance approved and build task created.");
    assert!(resp.governance.overall_allowed);
    assert_eq!(resp.governance.worst_severity, Severity::Warn);

    let tasks = sink.tasks.lock().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Deal dashboard");
    assert_eq!(tasks[0].metadata.estimated_hours, 12);
}

#[test]
fn test_unavailable_sink_still_accepts() {
    let resp = submit_build_request(&gate(), &NoTaskSink, &dashboard()).unwrap();
    assert!(resp.accepted);
    assert!(!resp.task_created);
    assert!(resp.task_id.is_none());
    assert_eq!(resp.state, BuildState::DelegationFailed);
    assert!(resp.state.is_approved());
    assert!(
        resp.message
            .starts_with("Governance approved, but the build task could not be created:")
    );
    assert!(resp.message.contains("no task sink configured"));
}

#[test]
fn test_broken_queue_reports_delegation_failure() {
    let tmp = tempdir().unwrap();
    let queue = TaskQueue::new(tmp.path().join("missing").join("build_tasks.jsonl"));
    let resp = submit_build_request(&gate(), &queue, &dashboard()).unwrap();
    assert!(resp.accepted);
    assert!(!resp.task_created);
    assert_eq!(resp.state, BuildState::DelegationFailed);
}

#[test]
fn test_low_importance_is_denied_as_distraction() {
    let sink = RecordingSink::default();
    let mut req = dashboard();
    req.strategic_importance = 3;
    let resp = submit_build_request(&gate(), &sink, &req).unwrap();

    assert!(!resp.accepted);
    assert!(!resp.task_created);
    assert_eq!(resp.state, BuildState::Denied);
    assert_eq!(
        resp.trail.states(),
        &[BuildState::Received, BuildState::Evaluating, BuildState::Denied]
    );
    assert_eq!(resp.governance.blocked_by, vec!["strategy".to_string()]);
    assert_eq!(resp.message, "Governance blocked this build request.");
    assert!(sink.tasks.lock().unwrap().is_empty());
}

#[test]
fn test_governance_flags_reach_the_panel() {
    let sink = RecordingSink::default();
    let mut req = dashboard();
    req.governance_flags
        .insert("recording_without_consent".into(), Value::Bool(true));
    let resp = submit_build_request(&gate(), &sink, &req).unwrap();
    assert!(!resp.accepted);
    assert_eq!(resp.governance.blocked_by, vec!["legal".to_string()]);
    assert!(sink.tasks.lock().unwrap().is_empty());
}

#[test]
fn test_high_complexity_trips_strategy_and_downside() {
    let mut req = dashboard();
    req.complexity_score = 9;
    let resp = submit_build_request(&gate(), &NoTaskSink, &req).unwrap();
    assert!(!resp.accepted);
    assert_eq!(
        resp.governance.blocked_by,
        vec!["strategy".to_string(), "downside".to_string()]
    );
}

#[test]
fn test_invalid_request_fails_before_evaluation() {
    let sink = RecordingSink::default();
    let mut req = dashboard();
    req.strategic_importance = 0;
    let err = submit_build_request(&gate(), &sink, &req).unwrap_err();
    assert!(err.is_input_validation());
    assert_eq!(err.status_code(), 400);
    assert!(sink.tasks.lock().unwrap().is_empty());
}

#[test]
fn test_unknown_request_field_is_rejected() {
    let parsed: Result<BuildRequest, _> = serde_json::from_value(json!({
        "title": "t", "description": "d", "vertical": "v", "urgency": "high"
    }));
    assert!(parsed.is_err());
}

#[test]
fn test_queue_receipt_matches_stored_task() {
    let tmp = tempdir().unwrap();
    let queue = TaskQueue::new(tmp.path().join("build_tasks.jsonl"));
    let first = submit_build_request(&gate(), &queue, &dashboard()).unwrap();
    let second = submit_build_request(&gate(), &queue, &dashboard()).unwrap();

    let stored = queue.read_all().unwrap();
    assert_eq!(stored.len(), 2);
    assert_eq!(first.task_id.as_deref(), Some(stored[0].task_id.as_str()));
    assert_eq!(second.task_id.as_deref(), Some(stored[1].task_id.as_str()));
    assert_ne!(stored[0].task_id, stored[1].task_id);
    assert_eq!(stored[0].status, "queued");
    assert_eq!(stored[0].task, dashboard().to_task());
}

#[test]
fn test_response_serializes_states_in_screaming_case() {
    let resp = submit_build_request(&gate(), &NoTaskSink, &dashboard()).unwrap();
    let v = serde_json::to_value(&resp).unwrap();
    assert_eq!(v["state"], "DELEGATION_FAILED");
    assert_eq!(v["trail"][0], "RECEIVED");
    assert!(v.get("task_response").is_none());
}

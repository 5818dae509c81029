use std::sync::Arc;

use serde_json::{Value, json};
use tempfile::tempdir;
use tribunal::core::broker;
use tribunal::core::error::TribunalError;
use tribunal::core::policy::PolicyPatch;
use tribunal::core::policy_store::{MemoryPolicyStore, PolicyStore, SqlitePolicyStore};

fn defaults() -> Vec<(String, Value)> {
    vec![
        (
            "capacity".to_string(),
            json!({"energy": {"max_hours_per_week": 40, "hard_cap_hours_per_week": 55}}),
        ),
        (
            "financial".to_string(),
            json!({"risk": {"min_expected_roi": 0.12, "allow_high_leverage": false}}),
        ),
    ]
}

fn accept(_: &Value) -> Result<(), TribunalError> {
    Ok(())
}

fn hard_cap_above_max(body: &Value) -> Result<(), TribunalError> {
    let max = body["energy"]["max_hours_per_week"].as_i64().unwrap_or(0);
    let cap = body["energy"]["hard_cap_hours_per_week"].as_i64().unwrap_or(0);
    if cap < max {
        return Err(TribunalError::ValidationError("cap below max".into()));
    }
    Ok(())
}

fn seeded_stores(root: &std::path::Path) -> Vec<(&'static str, Arc<dyn PolicyStore>)> {
    let sqlite: Arc<dyn PolicyStore> = Arc::new(SqlitePolicyStore::open(root).unwrap());
    let memory: Arc<dyn PolicyStore> = Arc::new(MemoryPolicyStore::new());
    for store in [&sqlite, &memory] {
        store.seed_defaults(&defaults()).unwrap();
    }
    vec![("sqlite", sqlite), ("memory", memory)]
}

#[test]
fn test_seed_is_idempotent_and_starts_at_version_one() {
    let tmp = tempdir().unwrap();
    for (label, store) in seeded_stores(tmp.path()) {
        store.seed_defaults(&defaults()).unwrap();
        let records = store.list().unwrap();
        assert_eq!(records.len(), 2, "{}", label);
        assert!(records.iter().all(|r| r.version == 1), "{}", label);
        let names: Vec<&str> = records.iter().map(|r| r.evaluator.as_str()).collect();
        assert_eq!(names, vec!["capacity", "financial"], "{}", label);
    }
}

#[test]
fn test_seed_does_not_overwrite_patched_policy() {
    let tmp = tempdir().unwrap();
    for (label, store) in seeded_stores(tmp.path()) {
        store
            .patch(
                "financial",
                &PolicyPatch::new(json!({"risk": {"min_expected_roi": 0.2}})),
                &accept,
            )
            .unwrap();
        store.seed_defaults(&defaults()).unwrap();
        let record = store.get("financial").unwrap();
        assert_eq!(record.version, 2, "{}", label);
        assert_eq!(record.body["risk"]["min_expected_roi"], 0.2, "{}", label);
    }
}

#[test]
fn test_patch_merges_and_bumps_version() {
    let tmp = tempdir().unwrap();
    for (label, store) in seeded_stores(tmp.path()) {
        let record = store
            .patch(
                "capacity",
                &PolicyPatch::new(json!({"energy": {"max_hours_per_week": 45}})).by("alice"),
                &hard_cap_above_max,
            )
            .unwrap();
        assert_eq!(record.version, 2, "{}", label);
        assert_eq!(record.body["energy"]["max_hours_per_week"], 45, "{}", label);
        assert_eq!(record.body["energy"]["hard_cap_hours_per_week"], 55, "{}", label);
        assert_eq!(store.get("capacity").unwrap(), record, "{}", label);
        // Other records are untouched.
        assert_eq!(store.get("financial").unwrap().version, 1, "{}", label);
    }
}

#[test]
fn test_stale_expected_version_conflicts() {
    let tmp = tempdir().unwrap();
    for (label, store) in seeded_stores(tmp.path()) {
        let patch = PolicyPatch::new(json!({"energy": {"max_hours_per_week": 42}})).expecting(1);
        store.patch("capacity", &patch, &accept).unwrap();

        let err = store.patch("capacity", &patch, &accept).unwrap_err();
        match err {
            TribunalError::VersionConflict {
                evaluator,
                expected,
                actual,
            } => {
                assert_eq!(evaluator, "capacity");
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("{}: unexpected {:?}", label, other),
        }
        assert_eq!(store.get("capacity").unwrap().version, 2, "{}", label);
    }
}

#[test]
fn test_rejected_patch_changes_nothing() {
    let tmp = tempdir().unwrap();
    for (label, store) in seeded_stores(tmp.path()) {
        let before = store.get("capacity").unwrap();

        let unknown = PolicyPatch::new(json!({"energy": {"max_hours": 45}}));
        assert!(store.patch("capacity", &unknown, &accept).is_err(), "{}", label);

        let wrong_type = PolicyPatch::new(json!({"energy": {"max_hours_per_week": "lots"}}));
        assert!(store.patch("capacity", &wrong_type, &accept).is_err(), "{}", label);

        let refused = PolicyPatch::new(json!({"energy": {"hard_cap_hours_per_week": 20}}));
        let err = store
            .patch("capacity", &refused, &hard_cap_above_max)
            .unwrap_err();
        assert!(err.is_input_validation(), "{}", label);

        assert_eq!(store.get("capacity").unwrap(), before, "{}", label);
        assert!(store.history("capacity").unwrap().is_empty(), "{}", label);
    }
}

#[test]
fn test_unknown_evaluator_is_policy_not_found() {
    let tmp = tempdir().unwrap();
    for (label, store) in seeded_stores(tmp.path()) {
        assert!(
            matches!(store.get("oracle"), Err(TribunalError::PolicyNotFound(_))),
            "{}",
            label
        );
        let patch = PolicyPatch::new(json!({"x": 1}));
        assert!(
            matches!(
                store.patch("oracle", &patch, &accept),
                Err(TribunalError::PolicyNotFound(_))
            ),
            "{}",
            label
        );
        assert!(store.history("oracle").is_err(), "{}", label);
    }
}

#[test]
fn test_history_lists_committed_patches_in_order() {
    let tmp = tempdir().unwrap();
    for (label, store) in seeded_stores(tmp.path()) {
        for (hours, actor) in [(41, "alice"), (43, "bob")] {
            store
                .patch(
                    "capacity",
                    &PolicyPatch::new(json!({"energy": {"max_hours_per_week": hours}})).by(actor),
                    &accept,
                )
                .unwrap();
        }
        let history = store.history("capacity").unwrap();
        assert_eq!(history.len(), 2, "{}", label);
        assert_eq!(history[0].version, 2, "{}", label);
        assert_eq!(history[0].actor, "alice", "{}", label);
        assert_eq!(history[1].version, 3, "{}", label);
        assert_eq!(history[1].patch, json!({"energy": {"max_hours_per_week": 43}}));
        assert!(store.history("financial").unwrap().is_empty(), "{}", label);
    }
}

#[test]
fn test_sqlite_policies_survive_reopen() {
    let tmp = tempdir().unwrap();
    {
        let store = SqlitePolicyStore::open(tmp.path()).unwrap();
        store.seed_defaults(&defaults()).unwrap();
        store
            .patch(
                "financial",
                &PolicyPatch::new(json!({"risk": {"allow_high_leverage": true}})),
                &accept,
            )
            .unwrap();
    }
    let reopened = SqlitePolicyStore::open(tmp.path()).unwrap();
    reopened.seed_defaults(&defaults()).unwrap();
    let record = reopened.get("financial").unwrap();
    assert_eq!(record.version, 2);
    assert_eq!(record.body["risk"]["allow_high_leverage"], true);
    assert_eq!(reopened.history("financial").unwrap().len(), 1);
}

#[test]
fn test_sqlite_operations_leave_broker_events() {
    let tmp = tempdir().unwrap();
    let store = SqlitePolicyStore::open(tmp.path()).unwrap();
    store.seed_defaults(&defaults()).unwrap();
    store
        .patch(
            "capacity",
            &PolicyPatch::new(json!({"energy": {"max_hours": 1}})).by("mallory"),
            &accept,
        )
        .unwrap_err();
    store
        .patch(
            "capacity",
            &PolicyPatch::new(json!({"energy": {"max_hours_per_week": 44}})).by("carol"),
            &accept,
        )
        .unwrap();

    let events = broker::read_events(tmp.path()).unwrap();
    let ops: Vec<&str> = events.iter().map(|e| e.op.as_str()).collect();
    assert_eq!(ops, vec!["policy.init", "policy.seed", "policy.patch", "policy.patch"]);
    assert_eq!(events[2].status, "error");
    assert_eq!(events[2].actor, "mallory");
    assert_eq!(events[3].status, "success");
    assert_eq!(events[3].subject.as_deref(), Some("capacity"));
}

#[test]
fn test_concurrent_patches_serialize() {
    let tmp = tempdir().unwrap();
    for (label, store) in seeded_stores(tmp.path()) {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .patch(
                            "capacity",
                            &PolicyPatch::new(json!({"energy": {"max_hours_per_week": 40 + i}})),
                            &accept,
                        )
                        .unwrap()
                        .version
                })
            })
            .collect();
        let mut versions: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        versions.sort();
        assert_eq!(versions, (2..=9).collect::<Vec<u64>>(), "{}", label);
        assert_eq!(store.history("capacity").unwrap().len(), 8, "{}", label);
    }
}

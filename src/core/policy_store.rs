//! Policy Store: the only long-lived mutable state of the engine.
//!
//! Readers always see the last committed record. Writers are serialized
//! (broker lock for SQLite, a mutex for the in-memory store) and commit
//! with a compare-and-swap on `version`, so two patches to the same policy
//! can never interleave field by field.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::broker::DbBroker;
use crate::core::db;
use crate::core::error::TribunalError;
use crate::core::policy::{PolicyPatch, PolicyRecord, PolicyRevision, merge_patch};
use crate::core::time;

/// Hook the owning evaluator uses to reject a merged body before commit.
pub type PolicyCheck<'a> = &'a dyn Fn(&Value) -> Result<(), TribunalError>;

pub trait PolicyStore: Send + Sync {
    /// Stores `defaults` for every evaluator that has no record yet.
    fn seed_defaults(&self, defaults: &[(String, Value)]) -> Result<(), TribunalError>;

    fn list(&self) -> Result<Vec<PolicyRecord>, TribunalError>;

    fn get(&self, evaluator: &str) -> Result<PolicyRecord, TribunalError>;

    /// Deep-merges `patch` into the stored record, runs `check` on the result
    /// and commits it as `version + 1`. On any error nothing changes.
    fn patch(
        &self,
        evaluator: &str,
        patch: &PolicyPatch,
        check: PolicyCheck<'_>,
    ) -> Result<PolicyRecord, TribunalError>;

    /// Committed patches for `evaluator`, oldest first.
    fn history(&self, evaluator: &str) -> Result<Vec<PolicyRevision>, TribunalError>;
}

fn check_expected(
    evaluator: &str,
    patch: &PolicyPatch,
    current_version: u64,
) -> Result<(), TribunalError> {
    match patch.expected_version {
        Some(expected) if expected != current_version => Err(TribunalError::VersionConflict {
            evaluator: evaluator.to_string(),
            expected,
            actual: current_version,
        }),
        _ => Ok(()),
    }
}

// --- SQLite ---

pub struct SqlitePolicyStore {
    root: PathBuf,
    db_path: PathBuf,
}

impl SqlitePolicyStore {
    pub fn open(root: &Path) -> Result<Self, TribunalError> {
        db::initialize_governance_db(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            db_path: db::governance_db_path(root),
        })
    }

    fn broker(&self) -> DbBroker {
        DbBroker::new(&self.root)
    }
}

fn load_record(conn: &Connection, evaluator: &str) -> Result<PolicyRecord, TribunalError> {
    let row = conn
        .query_row(
            "SELECT evaluator, body, version, updated_at FROM policies WHERE evaluator = ?1",
            params![evaluator],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;
    let (evaluator, body, version, updated_at) =
        row.ok_or_else(|| TribunalError::PolicyNotFound(evaluator.to_string()))?;
    Ok(PolicyRecord {
        evaluator,
        version: version as u64,
        updated_at,
        body: serde_json::from_str(&body)?,
    })
}

impl PolicyStore for SqlitePolicyStore {
    fn seed_defaults(&self, defaults: &[(String, Value)]) -> Result<(), TribunalError> {
        self.broker()
            .with_conn(&self.db_path, "tribunal", None, "policy.seed", |conn| {
                let tx = conn.transaction()?;
                let now = time::now_epoch_z();
                for (evaluator, body) in defaults {
                    tx.execute(
                        "INSERT OR IGNORE INTO policies(evaluator, body, version, updated_at) VALUES(?1, ?2, 1, ?3)",
                        params![evaluator, body.to_string(), now],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
    }

    fn list(&self) -> Result<Vec<PolicyRecord>, TribunalError> {
        self.broker()
            .with_conn(&self.db_path, "tribunal", None, "policy.list", |conn| {
                let mut stmt = conn.prepare("SELECT evaluator FROM policies ORDER BY evaluator")?;
                let names = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                names.iter().map(|name| load_record(conn, name)).collect()
            })
    }

    fn get(&self, evaluator: &str) -> Result<PolicyRecord, TribunalError> {
        self.broker()
            .with_conn(&self.db_path, "tribunal", Some(evaluator), "policy.get", |conn| {
                load_record(conn, evaluator)
            })
    }

    fn patch(
        &self,
        evaluator: &str,
        patch: &PolicyPatch,
        check: PolicyCheck<'_>,
    ) -> Result<PolicyRecord, TribunalError> {
        self.broker().with_conn(
            &self.db_path,
            &patch.actor,
            Some(evaluator),
            "policy.patch",
            |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current = load_record(&tx, evaluator)?;
                check_expected(evaluator, patch, current.version)?;

                let merged = merge_patch(&current.body, &patch.body)?;
                check(&merged)?;

                let next = current.version + 1;
                let now = time::now_epoch_z();
                let changed = tx.execute(
                    "UPDATE policies SET body = ?1, version = ?2, updated_at = ?3 WHERE evaluator = ?4 AND version = ?5",
                    params![merged.to_string(), next as i64, now, evaluator, current.version as i64],
                )?;
                if changed != 1 {
                    let actual = load_record(&tx, evaluator)?.version;
                    return Err(TribunalError::VersionConflict {
                        evaluator: evaluator.to_string(),
                        expected: current.version,
                        actual,
                    });
                }
                tx.execute(
                    "INSERT INTO policy_revisions(revision_id, evaluator, version, patch, actor, ts) VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        time::new_event_id(),
                        evaluator,
                        next as i64,
                        patch.body.to_string(),
                        patch.actor,
                        now
                    ],
                )?;
                tx.commit()?;

                Ok(PolicyRecord {
                    evaluator: evaluator.to_string(),
                    version: next,
                    updated_at: now,
                    body: merged,
                })
            },
        )
    }

    fn history(&self, evaluator: &str) -> Result<Vec<PolicyRevision>, TribunalError> {
        self.broker().with_conn(
            &self.db_path,
            "tribunal",
            Some(evaluator),
            "policy.history",
            |conn| {
                load_record(conn, evaluator)?;
                let mut stmt = conn.prepare(
                    "SELECT revision_id, evaluator, version, patch, actor, ts FROM policy_revisions WHERE evaluator = ?1 ORDER BY version",
                )?;
                let rows = stmt.query_map(params![evaluator], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?;
                let mut out = Vec::new();
                for r in rows {
                    let (revision_id, evaluator, version, patch, actor, ts) = r?;
                    out.push(PolicyRevision {
                        revision_id,
                        evaluator,
                        version: version as u64,
                        patch: serde_json::from_str(&patch)?,
                        actor,
                        ts,
                    });
                }
                Ok(out)
            },
        )
    }
}

// --- In-memory ---

#[derive(Default)]
struct MemoryState {
    records: BTreeMap<String, PolicyRecord>,
    revisions: Vec<PolicyRevision>,
}

/// Process-local store; one mutex makes every patch a single transaction.
#[derive(Default)]
pub struct MemoryPolicyStore {
    state: Mutex<MemoryState>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        // Records are only replaced whole after every check passed.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl PolicyStore for MemoryPolicyStore {
    fn seed_defaults(&self, defaults: &[(String, Value)]) -> Result<(), TribunalError> {
        let mut state = self.lock();
        let now = time::now_epoch_z();
        for (evaluator, body) in defaults {
            state
                .records
                .entry(evaluator.clone())
                .or_insert_with(|| PolicyRecord {
                    evaluator: evaluator.clone(),
                    version: 1,
                    updated_at: now.clone(),
                    body: body.clone(),
                });
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<PolicyRecord>, TribunalError> {
        Ok(self.lock().records.values().cloned().collect())
    }

    fn get(&self, evaluator: &str) -> Result<PolicyRecord, TribunalError> {
        self.lock()
            .records
            .get(evaluator)
            .cloned()
            .ok_or_else(|| TribunalError::PolicyNotFound(evaluator.to_string()))
    }

    fn patch(
        &self,
        evaluator: &str,
        patch: &PolicyPatch,
        check: PolicyCheck<'_>,
    ) -> Result<PolicyRecord, TribunalError> {
        let mut state = self.lock();
        let current = state
            .records
            .get(evaluator)
            .ok_or_else(|| TribunalError::PolicyNotFound(evaluator.to_string()))?;
        check_expected(evaluator, patch, current.version)?;

        let merged = merge_patch(&current.body, &patch.body)?;
        check(&merged)?;

        let record = PolicyRecord {
            evaluator: evaluator.to_string(),
            version: current.version + 1,
            updated_at: time::now_epoch_z(),
            body: merged,
        };
        state.revisions.push(PolicyRevision {
            revision_id: time::new_event_id(),
            evaluator: evaluator.to_string(),
            version: record.version,
            patch: patch.body.clone(),
            actor: patch.actor.clone(),
            ts: record.updated_at.clone(),
        });
        state.records.insert(evaluator.to_string(), record.clone());
        Ok(record)
    }

    fn history(&self, evaluator: &str) -> Result<Vec<PolicyRevision>, TribunalError> {
        let state = self.lock();
        if !state.records.contains_key(evaluator) {
            return Err(TribunalError::PolicyNotFound(evaluator.to_string()));
        }
        Ok(state
            .revisions
            .iter()
            .filter(|r| r.evaluator == evaluator)
            .cloned()
            .collect())
    }
}

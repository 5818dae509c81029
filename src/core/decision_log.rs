//! Append-only record of aggregate decisions.
//!
//! Recording is best effort: a gate asks the log to record and carries on
//! whatever the answer. The log is read back only by `tribunal log` and by
//! audit tooling outside this crate.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::context::Context;
use crate::core::decision::AggregateDecision;
use crate::core::error::TribunalError;
use crate::core::time;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub event_id: String,
    pub ts: String,
    pub context_type: String,
    /// SHA-256 of the canonical context; the raw values are not stored.
    pub context_digest: String,
    pub evaluators: Vec<String>,
    pub decision: AggregateDecision,
}

impl DecisionRecord {
    pub fn new(ctx: &Context, decision: &AggregateDecision) -> Self {
        Self {
            event_id: time::new_event_id(),
            ts: time::now_epoch_z(),
            context_type: ctx.context_type.clone(),
            context_digest: ctx.digest(),
            evaluators: decision.checks.iter().map(|c| c.evaluator.clone()).collect(),
            decision: decision.clone(),
        }
    }
}

/// Outcome of one recording attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Stored { event_id: String },
    Unavailable(String),
}

pub trait DecisionLog: Send + Sync {
    fn record(&self, record: &DecisionRecord) -> Recorded;
}

/// Used when decision logging is switched off in config.
pub struct DisabledDecisionLog;

impl DecisionLog for DisabledDecisionLog {
    fn record(&self, _record: &DecisionRecord) -> Recorded {
        Recorded::Unavailable("decision log disabled".to_string())
    }
}

/// One JSON line per decision in `decisions.events.jsonl`.
pub struct JsonlDecisionLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlDecisionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &DecisionRecord) -> Result<(), TribunalError> {
        let line = serde_json::to_string(record)?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(f, "{}", line)?;
        Ok(())
    }

    /// Last `limit` records, oldest first. Unreadable lines are skipped.
    pub fn read_recent(&self, limit: usize) -> Result<Vec<DecisionRecord>, TribunalError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let records: Vec<DecisionRecord> = content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        let skip = records.len().saturating_sub(limit);
        Ok(records.into_iter().skip(skip).collect())
    }
}

impl DecisionLog for JsonlDecisionLog {
    fn record(&self, record: &DecisionRecord) -> Recorded {
        match self.append(record) {
            Ok(()) => Recorded::Stored {
                event_id: record.event_id.clone(),
            },
            Err(e) => Recorded::Unavailable(e.to_string()),
        }
    }
}

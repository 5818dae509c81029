use crate::core::db;
use crate::core::error;
use crate::core::schemas;
use crate::core::time;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Single writer for the governance database.
///
/// Every operation runs under one process-wide lock on a fresh connection
/// and leaves one line in `broker.events.jsonl`, success or not.
pub struct DbBroker {
    audit_log_path: PathBuf,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BrokerEvent {
    pub ts: String,
    pub event_id: String,
    pub actor: String,
    /// Evaluator whose policy the operation touched, if any.
    pub subject: Option<String>,
    pub op: String,
    pub db_id: String,
    pub status: String,
}

impl DbBroker {
    pub fn new(root: &Path) -> Self {
        Self {
            audit_log_path: root.join(schemas::BROKER_LOG_NAME),
        }
    }

    /// Execute a closure with a serialized connection to the specified DB.
    pub fn with_conn<F, R>(
        &self,
        db_path: &Path,
        actor: &str,
        subject: Option<&str>,
        op_name: &str,
        f: F,
    ) -> Result<R, error::TribunalError>
    where
        F: FnOnce(&mut Connection) -> Result<R, error::TribunalError>,
    {
        static DB_LOCK: Mutex<()> = Mutex::new(());
        // A panic inside another holder cannot leave the database half-written
        // (transactions roll back on drop), so a poisoned lock is still usable.
        let _lock = DB_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let db_id = db_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();
        let mut conn = db::db_connect(&db_path.to_string_lossy())?;

        let result = f(&mut conn);

        let status = if result.is_ok() { "success" } else { "error" };
        self.log_event(actor, subject, op_name, &db_id, status)?;

        result
    }

    fn log_event(
        &self,
        actor: &str,
        subject: Option<&str>,
        op: &str,
        db_id: &str,
        status: &str,
    ) -> Result<(), error::TribunalError> {
        let ev = BrokerEvent {
            ts: time::now_epoch_z(),
            event_id: time::new_event_id(),
            actor: actor.to_string(),
            subject: subject.map(|s| s.to_string()),
            op: op.to_string(),
            db_id: db_id.to_string(),
            status: status.to_string(),
        };

        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.audit_log_path)?;
        writeln!(f, "{}", serde_json::to_string(&ev)?)?;
        Ok(())
    }
}

/// Reads the broker audit trail, oldest first.
pub fn read_events(root: &Path) -> Result<Vec<BrokerEvent>, error::TribunalError> {
    let path = root.join(schemas::BROKER_LOG_NAME);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).map_err(error::TribunalError::from))
        .collect()
}

pub fn schema() -> serde_json::Value {
    serde_json::json!({
        "name": "broker",
        "version": "0.1.0",
        "description": "Serialized access to the governance database with a mutation audit log",
        "storage": [schemas::GOVERNANCE_DB_NAME, schemas::BROKER_LOG_NAME]
    })
}

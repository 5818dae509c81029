use crate::core::broker::DbBroker;
use crate::core::error;
use crate::core::schemas;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

pub fn db_connect(db_path: &str) -> Result<Connection, error::TribunalError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    conn.execute("PRAGMA foreign_keys=ON;", [])?;
    Ok(conn)
}

pub fn governance_db_path(root: &Path) -> PathBuf {
    root.join(schemas::GOVERNANCE_DB_NAME)
}

pub fn initialize_governance_db(root: &Path) -> Result<(), error::TribunalError> {
    let broker = DbBroker::new(root);
    let db_path = governance_db_path(root);

    broker.with_conn(&db_path, "tribunal", None, "policy.init", |conn| {
        conn.execute(schemas::POLICY_DB_SCHEMA_POLICIES, [])?;
        conn.execute(schemas::POLICY_DB_SCHEMA_REVISIONS, [])?;
        conn.execute(schemas::POLICY_DB_SCHEMA_REVISIONS_INDEX, [])?;
        Ok(())
    })
}

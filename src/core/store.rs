//! Store root handling.
//!
//! A store is a directory holding the governance database and the
//! append-only event files. The in-memory backend keeps policies in
//! process but still writes its event files under the root.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::TribunalError;
use crate::core::schemas;

/// Where policy records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// `governance.db` under the store root; survives restarts.
    #[default]
    Sqlite,
    /// Process-local; defaults are re-seeded on every start.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Store {
    pub backend: StoreBackend,
    /// Absolute path to the store root directory
    pub root: PathBuf,
}

impl Store {
    /// Opens (and creates if needed) the store directory.
    pub fn open(root: &Path, backend: StoreBackend) -> Result<Self, TribunalError> {
        fs::create_dir_all(root)?;
        let root = fs::canonicalize(root)?;
        Ok(Self { backend, root })
    }

    pub fn governance_db_path(&self) -> PathBuf {
        self.root.join(schemas::GOVERNANCE_DB_NAME)
    }

    pub fn decision_log_path(&self) -> PathBuf {
        self.root.join(schemas::DECISION_LOG_NAME)
    }

    pub fn task_queue_path(&self) -> PathBuf {
        self.root.join(schemas::TASK_QUEUE_NAME)
    }

    pub fn broker_log_path(&self) -> PathBuf {
        self.root.join(schemas::BROKER_LOG_NAME)
    }
}

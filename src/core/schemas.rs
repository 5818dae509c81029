//! Storage layout of a Tribunal store root.
//!
//! One SQLite database holds the long-lived mutable state (policies and
//! their revision trail); everything append-only lives in JSONL files next
//! to it.

pub const GOVERNANCE_DB_NAME: &str = "governance.db";

pub const POLICY_DB_SCHEMA_POLICIES: &str = "
    CREATE TABLE IF NOT EXISTS policies (
        evaluator TEXT PRIMARY KEY,
        body TEXT NOT NULL,         -- JSON object, sections of thresholds
        version INTEGER NOT NULL,
        updated_at TEXT NOT NULL
    )
";
pub const POLICY_DB_SCHEMA_REVISIONS: &str = "
    CREATE TABLE IF NOT EXISTS policy_revisions (
        revision_id TEXT PRIMARY KEY,
        evaluator TEXT NOT NULL,
        version INTEGER NOT NULL,
        patch TEXT NOT NULL,        -- JSON object as submitted
        actor TEXT NOT NULL,
        ts TEXT NOT NULL,
        FOREIGN KEY(evaluator) REFERENCES policies(evaluator)
    )
";
pub const POLICY_DB_SCHEMA_REVISIONS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_policy_revisions_evaluator ON policy_revisions(evaluator, version)";

pub const BROKER_LOG_NAME: &str = "broker.events.jsonl";
pub const DECISION_LOG_NAME: &str = "decisions.events.jsonl";
pub const TASK_QUEUE_NAME: &str = "build_tasks.jsonl";
pub const CONFIG_FILE_NAME: &str = "tribunal.toml";

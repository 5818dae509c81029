use crate::core::decision::AggregateDecision;
use rusqlite;
use std::env;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TribunalError {
    #[error("SQLite error: {0}")]
    RusqliteError(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] env::VarError),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Unknown evaluator: {0}")]
    UnknownEvaluator(String),
    #[error("No policy stored for evaluator: {0}")]
    PolicyNotFound(String),
    #[error("Policy for {evaluator} is at version {actual}, patch expected {expected}")]
    VersionConflict {
        evaluator: String,
        expected: u64,
        actual: u64,
    },
    #[error("Evaluator {evaluator} failed: {message}")]
    EvaluatorFailure { evaluator: String, message: String },
    #[error("{message}")]
    GovernanceBlocked {
        message: String,
        governance: Box<AggregateDecision>,
    },
    #[error("Collaborator failure: {0}")]
    CollaboratorFailure(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl TribunalError {
    /// Errors caused by the caller's input rather than by the engine.
    /// Nothing has been evaluated or mutated when one of these is returned.
    pub fn is_input_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_) | Self::UnknownEvaluator(_) | Self::PolicyNotFound(_)
        )
    }

    /// Status a transport adapter should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError(_) | Self::UnknownEvaluator(_) => 400,
            Self::PolicyNotFound(_) | Self::NotFound(_) => 404,
            Self::VersionConflict { .. } | Self::GovernanceBlocked { .. } => 409,
            _ => 500,
        }
    }

    pub(crate) fn evaluator(name: &str, message: impl Into<String>) -> Self {
        Self::EvaluatorFailure {
            evaluator: name.to_string(),
            message: message.into(),
        }
    }
}

//! `tribunal.toml` loading.
//!
//! Lookup order: the working directory, then the store root (`--home`,
//! else `TRIBUNAL_HOME`, else `.tribunal`). No file means defaults. The home
//! and `TRIBUNAL_LOG` win over whatever the file says.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::TribunalError;
use crate::core::schemas;
use crate::core::store::StoreBackend;

pub const HOME_ENV: &str = "TRIBUNAL_HOME";
pub const LOG_ENV: &str = "TRIBUNAL_LOG";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TribunalConfig {
    pub store: StoreConfig,
    pub gate: GateConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub root: PathBuf,
    pub backend: StoreBackend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".tribunal"),
            backend: StoreBackend::Sqlite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GateConfig {
    /// Panel used when a request names none; empty means every evaluator.
    pub default_evaluators: Vec<String>,
    pub decision_log: bool,
    /// Forward approved build requests to the local task queue.
    pub task_queue: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_evaluators: Vec::new(),
            decision_log: true,
            task_queue: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "warn".to_string(),
        }
    }
}

impl TribunalConfig {
    /// Loads config for a process started in `cwd`, reading the real
    /// environment. `home` is an explicit store root (the `--home` flag) and
    /// wins over `TRIBUNAL_HOME`.
    pub fn load(cwd: &Path, home: Option<&Path>) -> Result<Self, TribunalError> {
        Self::load_with(cwd, home, |key| std::env::var(key).ok())
    }

    pub fn load_with<E>(cwd: &Path, home: Option<&Path>, env: E) -> Result<Self, TribunalError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let home = home.map(Path::to_path_buf).or_else(|| {
            env(HOME_ENV)
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from)
        });

        let root = absolutize(cwd, home.as_deref().unwrap_or(StoreConfig::default().root.as_path()));
        let candidates = [
            cwd.join(schemas::CONFIG_FILE_NAME),
            root.join(schemas::CONFIG_FILE_NAME),
        ];

        let mut config = match candidates.iter().find(|p| p.is_file()) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(h) = home {
            config.store.root = h;
        }
        if let Some(filter) = env(LOG_ENV).filter(|v| !v.trim().is_empty()) {
            config.log.filter = filter;
        }
        config.store.root = absolutize(cwd, &config.store.root);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, TribunalError> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

fn absolutize(cwd: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        cwd.join(p)
    }
}

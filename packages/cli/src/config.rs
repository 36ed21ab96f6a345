//! `bgworker.toml` settings.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use db::DbConfig;
use queue_core::{DEFAULT_QUEUES, Queue};
use serde::Deserialize;
use worker::{DEFAULT_MAX_EXECUTION_TIME, ProcessRunnable, RunnableRegistry, WorkerConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Queues that exist. Workers refuse to start on anything else.
    pub queues: Vec<String>,
    pub database: DatabaseSettings,
    pub worker: WorkerSettings,
    pub commands: Vec<CommandSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queues: DEFAULT_QUEUES.iter().map(|q| q.to_string()).collect(),
            database: DatabaseSettings::default(),
            worker: WorkerSettings::default(),
            commands: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseSettings {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// On-disk database shared by every `bgworker` process started in the same
/// directory. Builds without the `rocksdb` feature fall back to memory.
pub const DEFAULT_ENDPOINT: &str = if cfg!(feature = "rocksdb") {
    "rocksdb://bgworker.db"
} else {
    "mem://"
};

impl Default for DatabaseSettings {
    fn default() -> Self {
        let defaults = DbConfig::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            namespace: defaults.namespace,
            database: defaults.database,
            username: None,
            password: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorkerSettings {
    /// Zero keeps the worker running until it is stopped.
    pub max_execution_time_secs: u64,
    /// Zero polls again immediately after an empty poll.
    pub idle_delay_ms: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_execution_time_secs: DEFAULT_MAX_EXECUTION_TIME.as_secs(),
            idle_delay_ms: 0,
        }
    }
}

/// An external program exposed as a job command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandSettings {
    pub name: String,
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub current_dir: Option<PathBuf>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Settings {
    /// Load settings from `path`. A missing file means built-in defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: Settings = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queues.is_empty() {
            return Err(ConfigError::Invalid("at least one queue is required".into()));
        }
        if let Some(bad) = self.queues.iter().find(|q| !Queue::is_valid_name(q)) {
            return Err(ConfigError::Invalid(format!("invalid queue name {:?}", bad)));
        }

        let mut seen = BTreeSet::new();
        for command in &self.commands {
            if command.name.trim().is_empty() {
                return Err(ConfigError::Invalid("command with an empty name".into()));
            }
            if !seen.insert(command.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "command `{}` is defined more than once",
                    command.name
                )));
            }
        }
        Ok(())
    }

    pub fn db_config(&self) -> DbConfig {
        let db = &self.database;
        let config = DbConfig::default()
            .with_endpoint(db.endpoint.clone())
            .with_namespace(db.namespace.clone())
            .with_database(db.database.clone());
        match (&db.username, &db.password) {
            (Some(user), Some(pass)) => config.with_credentials(user.clone(), pass.clone()),
            _ => config,
        }
    }

    /// Worker configuration for `queue`. `None` overrides fall back to the file.
    pub fn worker_config(
        &self,
        queue: &str,
        max_execution_time_secs: Option<u64>,
        idle_delay_ms: Option<u64>,
    ) -> WorkerConfig {
        let max = max_execution_time_secs.unwrap_or(self.worker.max_execution_time_secs);
        let idle = idle_delay_ms.unwrap_or(self.worker.idle_delay_ms);
        WorkerConfig::new(queue)
            .with_max_execution_time(Duration::from_secs(max))
            .with_idle_delay(Duration::from_millis(idle))
    }

    /// One process runnable per configured command.
    pub fn runnables(&self) -> RunnableRegistry {
        let mut registry = RunnableRegistry::new();
        for command in &self.commands {
            let mut runnable = ProcessRunnable::new(command.name.clone(), command.program.clone())
                .with_base_args(command.args.iter().cloned());
            if let Some(dir) = &command.current_dir {
                runnable = runnable.with_current_dir(dir.clone());
            }
            if let Some(secs) = command.timeout_secs.filter(|s| *s > 0) {
                runnable = runnable.with_timeout(Duration::from_secs(secs));
            }
            registry.register(runnable);
        }
        registry
    }
}

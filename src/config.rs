//! Configuration System
//!
//! Layered configuration: built-in defaults, the global user file, workspace files and
//! `SHOTQUEUE__`-prefixed environment variables, merged in that order.

use crate::backend::BackendConfig;
use crate::logging::LoggingConfig;
use crate::variation::GrammarConfig;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShotQueueConfig {
    #[serde(default)]
    pub grammar: GrammarConfig,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Checkpoints older than this are discarded on load.
    #[serde(default = "default_staleness_window_secs")]
    pub staleness_window_secs: u64,
}

fn default_staleness_window_secs() -> u64 {
    300
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            staleness_window_secs: default_staleness_window_secs(),
        }
    }
}

impl CheckpointConfig {
    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database directory. Defaults to the platform data directory.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        ProjectDirs::from("", "", "shotqueue")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".shotqueue"))
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve_data_dir().join("shotqueue.sled")
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Grammar(String),
    Checkpoint(String),
    Backend(String),
    Logging(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Grammar(msg) => write!(f, "Grammar: {}", msg),
            ValidationError::Checkpoint(msg) => write!(f, "Checkpoint: {}", msg),
            ValidationError::Backend(msg) => write!(f, "Backend: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl ShotQueueConfig {
    /// Validate the entire configuration, collecting every violation.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.grammar.max_options == 0 {
            errors.push(ValidationError::Grammar(
                "max_options must be at least 1".to_string(),
            ));
        }
        if self.grammar.max_preview == 0 {
            errors.push(ValidationError::Grammar(
                "max_preview must be at least 1".to_string(),
            ));
        }
        if self.grammar.max_combinations == 0 {
            errors.push(ValidationError::Grammar(
                "max_combinations must be at least 1".to_string(),
            ));
        }
        if self.checkpoint.staleness_window_secs == 0 {
            errors.push(ValidationError::Checkpoint(
                "staleness_window_secs must be at least 1".to_string(),
            ));
        }
        if let Err(e) = self.backend.validate() {
            errors.push(ValidationError::Backend(e));
        }
        if let Err(e) = self.logging.validate() {
            errors.push(ValidationError::Logging(e));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

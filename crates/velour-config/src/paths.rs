//! File system paths for Velour.

use crate::{CoreError, CoreResult};
use std::path::PathBuf;

/// Credential store filename under the base directory.
const CREDENTIALS_FILE_NAME: &str = "credentials.json";

/// Manages file system paths.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Base directory for local state (~/.velour)
    base_dir: PathBuf,
}

impl Paths {
    /// Create a new Paths instance rooted at `~/.velour`.
    pub fn new() -> CoreResult<Self> {
        let home = dirs::home_dir()
            .ok_or(CoreError::NoHomeDir)?;

        Ok(Self {
            base_dir: home.join(".velour"),
        })
    }

    /// Create a new Paths instance with a custom base directory.
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Get the base directory (~/.velour).
    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the config file path (~/.velour/config.json).
    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Get the credential store path (~/.velour/credentials.json).
    pub fn credentials_file(&self) -> PathBuf {
        self.base_dir.join(CREDENTIALS_FILE_NAME)
    }

    /// Get the logs directory (~/.velour/logs).
    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    /// Get the JSONL log file path (~/.velour/logs/velour.jsonl).
    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("velour.jsonl")
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> CoreResult<()> {
        for dir in [self.base_dir.clone(), self.logs_dir()] {
            std::fs::create_dir_all(&dir)
                .map_err(|source| CoreError::CreateDir { path: dir, source })?;
        }
        Ok(())
    }
}

//! Errors raised while locating, loading or saving client configuration.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure in the `~/.velour` layout or the config file.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Nowhere to anchor `~/.velour`
    #[error("could not determine home directory")]
    NoHomeDir,

    #[error("failed to create {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to read config {}: {source}", path.display())]
    ReadConfig { path: PathBuf, source: io::Error },

    #[error("malformed config {}: {source}", path.display())]
    ParseConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to encode config: {0}")]
    EncodeConfig(#[source] serde_json::Error),

    #[error("failed to write config {}: {source}", path.display())]
    WriteConfig { path: PathBuf, source: io::Error },

    /// A required setting is blank
    #[error("{0} is empty")]
    MissingSetting(&'static str),

    #[error("invalid {setting} {value:?}: {source}")]
    InvalidUrl {
        setting: &'static str,
        value: String,
        source: url::ParseError,
    },

    #[error("{0} must be non-zero")]
    ZeroTimeout(&'static str),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

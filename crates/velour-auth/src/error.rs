//! Authentication error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Identity provider or backend unreachable
    #[error("Network unavailable: {0}")]
    Network(String),

    /// A gateway call exceeded its time budget
    #[error("Operation timed out")]
    Timeout,

    /// The user abandoned the interactive sign-in
    #[error("Sign-in cancelled")]
    UserCancelled,

    /// The identity provider rejected the request
    #[error("Identity provider error: {0}")]
    Provider(String),

    /// Credential store failure
    #[error("Credential store error: {0}")]
    Persistence(#[from] velour_storage::StorageError),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classification surfaced on [`crate::AuthState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Recoverable; retry later.
    Network,
    /// Interactive flow abandoned. Not shown to the user as a failure.
    UserCancelled,
    /// Terminal for this attempt.
    Provider,
    /// Local store failed; the transition still happened.
    Persistence,
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::Http(e) if e.status().is_some_and(|s| s.is_client_error()) => {
                ErrorKind::Provider
            }
            AuthError::Network(_) | AuthError::Timeout | AuthError::Http(_) => ErrorKind::Network,
            AuthError::UserCancelled => ErrorKind::UserCancelled,
            AuthError::Persistence(_) => ErrorKind::Persistence,
            AuthError::Provider(_)
            | AuthError::Json(_)
            | AuthError::InvalidUrl(_)
            | AuthError::InvalidStateTransition(_)
            | AuthError::Config(_) => ErrorKind::Provider,
        }
    }

    /// Returns true if this error is transient and the operation can be retried.
    ///
    /// Transient errors include:
    /// - Network unavailable
    /// - Timeouts
    /// - HTTP connect/timeout errors and 5xx status codes
    pub fn is_transient(&self) -> bool {
        match self {
            AuthError::Network(_) => true,
            AuthError::Timeout => true,
            AuthError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    return true;
                }
                if let Some(status) = e.status() {
                    return status.is_server_error();
                }
                false
            }
            _ => false,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

//! Session snapshot types.

use crate::{AuthError, ErrorKind, Phase};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use velour_storage::StoredIdentity;

/// Identity of the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Profile with only an id; the remaining fields are unknown.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: None,
            display_name: None,
            avatar_url: None,
            email_verified: false,
            created_at: None,
            updated_at: None,
        }
    }
}

impl From<StoredIdentity> for UserProfile {
    fn from(stored: StoredIdentity) -> Self {
        Self {
            id: stored.id,
            email: stored.email,
            display_name: stored.name,
            avatar_url: stored.picture,
            email_verified: stored.email_verified,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }
}

impl From<&UserProfile> for StoredIdentity {
    fn from(user: &UserProfile) -> Self {
        Self {
            id: user.id.clone(),
            email: user.email.clone(),
            name: user.display_name.clone(),
            picture: user.avatar_url.clone(),
            email_verified: user.email_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Credential bundle returned by the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: UserProfile,
    pub access_token: String,
    pub id_token: Option<String>,
    /// `None` when the provider did not say; such tokens are always due for refresh.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// True when the token stays valid for longer than `leeway`.
    pub fn is_fresh(&self, leeway: Duration, now: DateTime<Utc>) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let Ok(leeway) = chrono::Duration::from_std(leeway) else {
            return false;
        };
        match now.checked_add_signed(leeway) {
            Some(deadline) => expires_at > deadline,
            None => false,
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user.id)
            .field("access_token", &"<redacted>")
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Failure recorded on the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub message: String,
}

impl SessionError {
    pub(crate) fn persistence(err: &AuthError) -> Self {
        Self {
            kind: ErrorKind::Persistence,
            message: err.to_string(),
        }
    }
}

impl From<&AuthError> for SessionError {
    fn from(err: &AuthError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Immutable snapshot of the session.
///
/// User and tokens live together in one `Option<Credentials>`, so one can
/// never be present without the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthState {
    pub(crate) phase: Phase,
    pub(crate) credentials: Option<Credentials>,
    pub(crate) error: Option<SessionError>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            phase: Phase::Uninitialized,
            credentials: None,
            error: None,
        }
    }
}

impl AuthState {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.credentials.as_ref().map(|c| &c.user)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.access_token.as_str())
    }

    pub fn id_token(&self) -> Option<&str> {
        self.credentials.as_ref().and_then(|c| c.id_token.as_deref())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.credentials.as_ref().and_then(|c| c.expires_at)
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn error(&self) -> Option<&SessionError> {
        self.error.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase.holds_session() && self.credentials.is_some()
    }

    /// Serializable summary without tokens.
    pub fn payload(&self) -> AuthStateChangedPayload {
        AuthStateChangedPayload {
            phase: self.phase,
            user_id: self.user().map(|u| u.id.clone()),
            email: self.user().and_then(|u| u.email.clone()),
            error: self.error.as_ref().map(|e| e.message.clone()),
        }
    }
}

/// Payload for auth state change events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStateChangedPayload {
    /// Current phase.
    pub phase: Phase,
    /// User ID if signed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// User email if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

//! External collaborators consumed by the session manager.

use crate::{AuthError, AuthResult, Credentials, UserProfile};
use async_trait::async_trait;
use velour_storage::{CredentialStore, StorageError};

/// Identity provider: interactive sign-in, silent session lookup, teardown.
///
/// Errors must be classified through [`crate::AuthError`] so the manager can
/// tell a cancelled sign-in from a rejected one.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Return fresh credentials for an existing session, or `None` when
    /// there is no session to recover. Absence is not an error.
    async fn lookup_session(&self) -> AuthResult<Option<Credentials>>;

    /// Run the interactive flow. User abandonment is `AuthError::UserCancelled`.
    async fn interactive_login(&self) -> AuthResult<Credentials>;

    /// Tear down the provider session (remote and any provider-held local state).
    async fn clear_session(&self) -> AuthResult<()>;
}

/// Pushes a freshly authenticated identity to the backend profile service.
///
/// Advisory only: failures are logged and never undo authentication.
#[async_trait]
pub trait ProfileSync: Send + Sync {
    async fn sync_identity(&self, user: &UserProfile, access_token: &str) -> AuthResult<()>;
}

/// Used when no profile service is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProfileSync;

#[async_trait]
impl ProfileSync for NoopProfileSync {
    async fn sync_identity(&self, _user: &UserProfile, _access_token: &str) -> AuthResult<()> {
        Ok(())
    }
}

/// Run a credential store call on the blocking pool.
pub(crate) async fn with_store<T, F>(store: &CredentialStore, f: F) -> AuthResult<T>
where
    F: FnOnce(&CredentialStore) -> Result<T, StorageError> + Send + 'static,
    T: Send + 'static,
{
    let store = store.clone();
    match tokio::task::spawn_blocking(move || f(&store)).await {
        Ok(result) => result.map_err(AuthError::from),
        Err(e) => Err(AuthError::from(StorageError::Backend(format!(
            "storage task failed: {e}"
        )))),
    }
}

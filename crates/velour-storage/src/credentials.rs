//! High-level API for the persisted session record.

use crate::{SecureStorage, StorageError, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Last-known signed-in identity, as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredIdentity {
    /// Identity provider subject
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Typed access to the credential store.
///
/// Cheap to clone; clones share the same backend.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn SecureStorage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self { storage }
    }

    // ==========================================
    // Session identity
    // ==========================================

    /// Persist the signed-in identity, replacing any previous one.
    pub fn save_identity(&self, identity: &StoredIdentity) -> StorageResult<()> {
        let json =
            serde_json::to_string(identity).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::SESSION_IDENTITY, &json)
    }

    /// Load the persisted identity. `None` means signed out.
    pub fn load_identity(&self) -> StorageResult<Option<StoredIdentity>> {
        match self.storage.get(StorageKeys::SESSION_IDENTITY)? {
            Some(json) => {
                let identity: StoredIdentity = serde_json::from_str(&json)
                    .map_err(|e| StorageError::Encoding(e.to_string()))?;
                Ok(Some(identity))
            }
            None => Ok(None),
        }
    }

    /// Remove the persisted identity. Clearing an absent record is not an error.
    pub fn clear_identity(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::SESSION_IDENTITY)?;
        Ok(())
    }

    pub fn has_identity(&self) -> StorageResult<bool> {
        self.storage.has(StorageKeys::SESSION_IDENTITY)
    }

    // ==========================================
    // Refresh token
    // ==========================================

    pub fn set_refresh_token(&self, token: &str) -> StorageResult<()> {
        self.storage.set(StorageKeys::REFRESH_TOKEN, token)
    }

    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    pub fn delete_refresh_token(&self) -> StorageResult<bool> {
        self.storage.delete(StorageKeys::REFRESH_TOKEN)
    }

    /// Remove everything this store owns.
    pub fn clear_all(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::SESSION_IDENTITY)?;
        self.storage.delete(StorageKeys::REFRESH_TOKEN)?;
        Ok(())
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

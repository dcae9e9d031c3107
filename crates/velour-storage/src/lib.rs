//! Credential storage for the Velour client.
//!
//! Two backends implement [`SecureStorage`]:
//! - **File**: a JSON map under `~/.velour/credentials.json`, owner-readable only
//! - **Memory**: process-local, for tests and ephemeral hosts
//!
//! [`CredentialStore`] is the typed API the session manager consumes.

mod credentials;
mod file;
mod keys;
mod memory;
mod traits;

pub use credentials::{CredentialStore, StoredIdentity};
pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use traits::SecureStorage;

use std::sync::Arc;
use thiserror::Error;
use velour_config::Paths;

/// Error type for storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend could not service the request
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Create the default file-backed storage at `paths.credentials_file()`.
pub fn create_storage(paths: &Paths) -> StorageResult<Arc<dyn SecureStorage>> {
    let storage = FileStorage::new(paths.credentials_file())?;
    Ok(Arc::new(storage))
}

/// Create a CredentialStore with the default file storage.
pub fn create_credential_store(paths: &Paths) -> StorageResult<CredentialStore> {
    let storage = create_storage(paths)?;
    Ok(CredentialStore::new(storage))
}

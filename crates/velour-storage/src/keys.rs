//! Storage key constants.

/// Storage keys used by the Velour client
pub struct StorageKeys;

impl StorageKeys {
    /// Last-known signed-in identity (JSON). Absence means signed out.
    pub const SESSION_IDENTITY: &'static str = "session_identity";

    /// Identity provider refresh token
    pub const REFRESH_TOKEN: &'static str = "refresh_token";
}

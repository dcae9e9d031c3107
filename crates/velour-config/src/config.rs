//! Configuration management for the Velour client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default identity provider tenant (can be overridden at compile time via VELOUR_AUTH0_DOMAIN).
pub const DEFAULT_DOMAIN: &str = match option_env!("VELOUR_AUTH0_DOMAIN") {
    Some(domain) => domain,
    None => "vibecodes.us.auth0.com",
};

/// Default public client id (can be overridden at compile time via VELOUR_AUTH0_CLIENT_ID).
pub const DEFAULT_CLIENT_ID: &str = match option_env!("VELOUR_AUTH0_CLIENT_ID") {
    Some(id) => id,
    None => "OejuDvHhYdI5z7a2x6K3R5zWQxhy0gY2",
};

/// Default API audience requested with every token.
pub const DEFAULT_AUDIENCE: &str = match option_env!("VELOUR_AUTH0_AUDIENCE") {
    Some(audience) => audience,
    None => "https://velour-backend.onrender.com/api",
};

/// Default OAuth scope. `offline_access` is required to receive a refresh token.
pub const DEFAULT_SCOPE: &str = "openid profile email offline_access";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Upper bound for a single non-interactive request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Upper bound for an interactive sign-in, including the time the user spends in the browser.
pub const DEFAULT_INTERACTIVE_TIMEOUT_SECS: u64 = 300;

/// Tokens expiring within this window are refreshed.
pub const DEFAULT_REFRESH_LEEWAY_SECS: u64 = 300;

/// Identity provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    /// Tenant domain, without scheme (e.g. `example.us.auth0.com`).
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Public client id.
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// API audience.
    #[serde(default = "default_audience")]
    pub audience: String,
    /// Space-separated scopes.
    #[serde(default = "default_scope")]
    pub scope: String,
}

impl Default for IdentityProviderConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            client_id: default_client_id(),
            audience: default_audience(),
            scope: default_scope(),
        }
    }
}

impl IdentityProviderConfig {
    /// Base URL of the tenant, `https://{domain}/`.
    pub fn base_url(&self) -> CoreResult<Url> {
        if self.domain.trim().is_empty() {
            return Err(CoreError::MissingSetting("identity_provider.domain"));
        }
        let raw = if self.domain.starts_with("http://") || self.domain.starts_with("https://") {
            format!("{}/", self.domain.trim_end_matches('/'))
        } else {
            format!("https://{}/", self.domain.trim_end_matches('/'))
        };
        Url::parse(&raw).map_err(|source| CoreError::InvalidUrl {
            setting: "identity_provider.domain",
            value: self.domain.clone(),
            source,
        })
    }
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_audience() -> String {
    DEFAULT_AUDIENCE.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_interactive_timeout_secs() -> u64 {
    DEFAULT_INTERACTIVE_TIMEOUT_SECS
}

fn default_refresh_leeway_secs() -> u64 {
    DEFAULT_REFRESH_LEEWAY_SECS
}

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Identity provider settings.
    #[serde(default)]
    pub identity_provider: IdentityProviderConfig,
    /// Backend profile API. Profile sync is skipped when unset.
    #[serde(default)]
    pub profile_api_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_interactive_timeout_secs")]
    pub interactive_timeout_secs: u64,
    #[serde(default = "default_refresh_leeway_secs")]
    pub refresh_leeway_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            identity_provider: IdentityProviderConfig::default(),
            profile_api_url: option_env!("VELOUR_PROFILE_API_URL").map(str::to_string),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            interactive_timeout_secs: DEFAULT_INTERACTIVE_TIMEOUT_SECS,
            refresh_leeway_secs: DEFAULT_REFRESH_LEEWAY_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| CoreError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CoreError::ParseConfig {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self).map_err(CoreError::EncodeConfig)?;
        let path = paths.config_file();
        std::fs::write(&path, content).map_err(|source| CoreError::WriteConfig { path, source })
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `VELOUR_*` overrides using the given lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).and_then(non_empty);

        if let Some(level) = get("VELOUR_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(domain) = get("VELOUR_AUTH0_DOMAIN") {
            self.identity_provider.domain = domain;
        }
        if let Some(client_id) = get("VELOUR_AUTH0_CLIENT_ID") {
            self.identity_provider.client_id = client_id;
        }
        if let Some(audience) = get("VELOUR_AUTH0_AUDIENCE") {
            self.identity_provider.audience = audience;
        }
        if let Some(url) = get("VELOUR_PROFILE_API_URL") {
            self.profile_api_url = Some(url);
        }
    }

    /// Check the values that would otherwise fail late at request time.
    pub fn validate(&self) -> CoreResult<()> {
        self.identity_provider.base_url()?;
        if self.identity_provider.client_id.trim().is_empty() {
            return Err(CoreError::MissingSetting("identity_provider.client_id"));
        }
        self.profile_api_url()?;
        if self.request_timeout_secs == 0 {
            return Err(CoreError::ZeroTimeout("request_timeout_secs"));
        }
        if self.interactive_timeout_secs == 0 {
            return Err(CoreError::ZeroTimeout("interactive_timeout_secs"));
        }
        Ok(())
    }

    /// Get the profile API URL as a parsed URL, if configured.
    pub fn profile_api_url(&self) -> CoreResult<Option<Url>> {
        self.profile_api_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|source| CoreError::InvalidUrl {
                    setting: "profile_api_url",
                    value: raw.to_string(),
                    source,
                })
            })
            .transpose()
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

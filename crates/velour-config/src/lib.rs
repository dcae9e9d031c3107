//! Configuration, filesystem layout, and logging bootstrap for Velour.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, IdentityProviderConfig, DEFAULT_AUDIENCE, DEFAULT_CLIENT_ID, DEFAULT_DOMAIN,
    DEFAULT_INTERACTIVE_TIMEOUT_SECS, DEFAULT_LOG_LEVEL, DEFAULT_REFRESH_LEEWAY_SECS,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SCOPE,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;

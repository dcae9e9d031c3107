//! CLI command implementations.

mod auth;

pub use auth::{login, logout, refresh, status, watch};

use crate::output::{self, OutputFormat};
use anyhow::{Context as _, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use velour_auth::{
    Auth0Gateway, DeviceAuthorization, NoopProfileSync, ProfileClient, ProfileSync,
    SessionConfig, SessionManager, Subscription,
};
use velour_config::{Config, Paths};

/// Everything a command needs: the session manager and how to print.
pub struct Context {
    pub manager: SessionManager,
    pub format: OutputFormat,
    _printer: Subscription,
}

impl Context {
    /// Composition root: paths, config, logging, store, gateways, manager.
    pub fn bootstrap(log_level: Option<&str>, format: OutputFormat) -> Result<Self> {
        let paths = Paths::new().context("failed to resolve the Velour directory")?;
        paths.ensure_dirs()?;
        let config = Config::load(&paths).context("failed to load configuration")?;

        let level = log_level.unwrap_or(config.log_level.as_str());
        velour_config::init_logging("velour-cli", level, Some(&paths));
        debug!(base_dir = %paths.base_dir().display(), "Starting Velour CLI");

        let manager = build_manager(&paths, &config, format)?;
        let printer = manager.subscribe(move |state| output::print_transition(state, &format));

        Ok(Self {
            manager,
            format,
            _printer: printer,
        })
    }
}

fn build_manager(paths: &Paths, config: &Config, format: OutputFormat) -> Result<SessionManager> {
    let store = velour_storage::create_credential_store(paths)?;
    let request_timeout = Duration::from_secs(config.request_timeout_secs);

    let gateway = Auth0Gateway::new(&config.identity_provider, store.clone(), request_timeout)?
        .with_prompt(move |auth| show_device_code(auth, format));

    let profile_sync: Arc<dyn ProfileSync> = match config.profile_api_url()? {
        Some(url) => Arc::new(ProfileClient::new(url, request_timeout)?),
        None => Arc::new(NoopProfileSync),
    };

    Ok(SessionManager::new(
        Arc::new(gateway),
        profile_sync,
        store,
        SessionConfig::from(config),
    ))
}

/// Show the device code and try to open the verification page.
fn show_device_code(auth: &DeviceAuthorization, format: OutputFormat) {
    let url = auth.browser_url();
    match format {
        OutputFormat::Text => {
            eprintln!();
            eprintln!("To sign in, open {} and enter the code:", auth.verification_uri);
            eprintln!();
            eprintln!("    {}", auth.user_code);
            eprintln!();
        }
        OutputFormat::Json => eprintln!(
            "{}",
            serde_json::json!({
                "status": "pending",
                "user_code": auth.user_code,
                "verification_uri": url,
            })
        ),
    }

    if let Err(e) = open::that(url) {
        debug!(error = %e, "Could not open browser");
    }
}

//! Session manager tuning.

use std::time::Duration;
use velour_config::Config;

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Maximum number of attempts.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
        let delay_ms = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// Timeouts and refresh policy for [`crate::SessionManager`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Bound on non-interactive gateway calls (lookup, clear, profile sync).
    pub gateway_timeout: Duration,
    /// Bound on the interactive sign-in, user think time included.
    pub interactive_timeout: Duration,
    /// Tokens expiring within this window are considered due for refresh.
    pub refresh_leeway: Duration,
    pub refresh: RefreshConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            gateway_timeout: Duration::from_secs(velour_config::DEFAULT_REQUEST_TIMEOUT_SECS),
            interactive_timeout: Duration::from_secs(
                velour_config::DEFAULT_INTERACTIVE_TIMEOUT_SECS,
            ),
            refresh_leeway: Duration::from_secs(velour_config::DEFAULT_REFRESH_LEEWAY_SECS),
            refresh: RefreshConfig::default(),
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(config: &Config) -> Self {
        Self {
            gateway_timeout: Duration::from_secs(config.request_timeout_secs),
            interactive_timeout: Duration::from_secs(config.interactive_timeout_secs),
            refresh_leeway: Duration::from_secs(config.refresh_leeway_secs),
            refresh: RefreshConfig::default(),
        }
    }
}

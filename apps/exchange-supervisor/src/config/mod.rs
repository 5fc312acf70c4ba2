//! Supervisor Configuration
//!
//! Settings structs with defaults and environment-variable loading. The
//! binary loads `.env` via `dotenvy` before calling
//! [`SupervisorConfig::from_env`].
//!
//! Recognized variables (all optional):
//! - `SUPERVISOR_MAX_ATTEMPTS`: retry ceiling per call (default 5)
//! - `SUPERVISOR_RETRY_MIN_TIMEOUT_MS`: first retry delay (default 500)
//! - `SUPERVISOR_RETRY_FACTOR`: retry delay multiplier (default 1.2)
//! - `SUPERVISOR_RETRY_JITTER`: jitter fraction (default 0.0)
//! - `SUPERVISOR_BUSY_WAIT_TIMEOUT_MS`: busy-gate wait bound (default 10000)
//! - `SUPERVISOR_BASE_TIMEOUT_MS`: reconnect backoff unit (default 5000)
//! - `SUPERVISOR_RECONCILE_INTERVAL_MS`: reconciliation period (default 60000)
//! - `SUPERVISOR_HEALTH_CHECK_INTERVAL_MS`: health-check period (default 15000)

use std::time::Duration;

use crate::resilience::RetryPolicy;

/// Venue API credentials for one tenant.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create new credentials.
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Get the API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Get the API secret.
    #[must_use]
    pub fn api_secret(&self) -> &str {
        &self.api_secret
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"[REDACTED]")
            .field("api_secret", &"[REDACTED]")
            .finish()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: {value}")]
    InvalidValue {
        /// The offending variable.
        var: &'static str,
        /// The raw value.
        value: String,
    },
}

/// Retry behavior for remote calls.
#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Maximum attempts per call (including the first).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub min_timeout: Duration,
    /// Multiplier applied to the retry delay each attempt.
    pub factor: f64,
    /// Jitter fraction applied to retry delays.
    pub jitter_factor: f64,
    /// Bound on waiting for the busy gate before logging an overrun.
    pub busy_wait_timeout: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            min_timeout: Duration::from_millis(500),
            factor: 1.2,
            jitter_factor: 0.0,
            busy_wait_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            min_timeout: settings.min_timeout,
            factor: settings.factor,
            jitter_factor: settings.jitter_factor,
        }
    }
}

/// Connection supervision timings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    /// Backoff unit for the reconnect schedule.
    pub base_timeout: Duration,
    /// Period of the reconciliation loop.
    pub reconciliation_interval: Duration,
    /// Period of the health-check loop.
    pub health_check_interval: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            base_timeout: Duration::from_secs(5),
            reconciliation_interval: Duration::from_secs(60),
            health_check_interval: Duration::from_secs(15),
        }
    }
}

/// Complete supervisor configuration.
#[derive(Debug, Clone, Default)]
pub struct SupervisorConfig {
    /// Retry behavior.
    pub retry: RetrySettings,
    /// Connection supervision timings.
    pub connection: ConnectionSettings,
}

impl SupervisorConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            retry: RetrySettings {
                max_attempts: parse_var(
                    "SUPERVISOR_MAX_ATTEMPTS",
                    defaults.retry.max_attempts,
                )?,
                min_timeout: parse_duration_ms(
                    "SUPERVISOR_RETRY_MIN_TIMEOUT_MS",
                    defaults.retry.min_timeout,
                )?,
                factor: parse_var("SUPERVISOR_RETRY_FACTOR", defaults.retry.factor)?,
                jitter_factor: parse_var("SUPERVISOR_RETRY_JITTER", defaults.retry.jitter_factor)?,
                busy_wait_timeout: parse_duration_ms(
                    "SUPERVISOR_BUSY_WAIT_TIMEOUT_MS",
                    defaults.retry.busy_wait_timeout,
                )?,
            },
            connection: ConnectionSettings {
                base_timeout: parse_duration_ms(
                    "SUPERVISOR_BASE_TIMEOUT_MS",
                    defaults.connection.base_timeout,
                )?,
                reconciliation_interval: parse_duration_ms(
                    "SUPERVISOR_RECONCILE_INTERVAL_MS",
                    defaults.connection.reconciliation_interval,
                )?,
                health_check_interval: parse_duration_ms(
                    "SUPERVISOR_HEALTH_CHECK_INTERVAL_MS",
                    defaults.connection.health_check_interval,
                )?,
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ConfigError::InvalidValue { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_duration_ms(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_var(
        var,
        default.as_millis() as u64,
    )?))
}

//! Provisioning runtime configuration.
//!
//! Loaded from environment variables with defaults; malformed values fail
//! fast instead of silently falling back.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Environment variable for the per-resource propagation timeout.
pub const ENV_PROPAGATION_TIMEOUT_SECS: &str = "PROVISIONING_PROPAGATION_TIMEOUT_SECS";

/// Environment variable for the concurrent propagation worker bound.
pub const ENV_MAX_CONCURRENT_PROPAGATIONS: &str = "PROVISIONING_MAX_CONCURRENT_PROPAGATIONS";

/// Environment variable for the log filter directive.
pub const ENV_LOG_FILTER: &str = "PROVISIONING_LOG_FILTER";

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },
}

fn default_propagation_timeout_secs() -> u64 {
    60
}

fn default_max_concurrent_propagations() -> usize {
    8
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Provisioning runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    /// Timeout imposed on each per-resource propagation step.
    #[serde(default = "default_propagation_timeout_secs")]
    pub propagation_timeout_secs: u64,

    /// Upper bound on concurrently running per-resource workers.
    #[serde(default = "default_max_concurrent_propagations")]
    pub max_concurrent_propagations: usize,

    /// Directive handed to [`crate::logging::init_logging`].
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            propagation_timeout_secs: default_propagation_timeout_secs(),
            max_concurrent_propagations: default_max_concurrent_propagations(),
            log_filter: default_log_filter(),
        }
    }
}

impl ProvisioningConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let propagation_timeout_secs = match lookup(ENV_PROPAGATION_TIMEOUT_SECS) {
            Some(raw) => parse_positive(ENV_PROPAGATION_TIMEOUT_SECS, &raw)?,
            None => defaults.propagation_timeout_secs,
        };

        let max_concurrent_propagations = match lookup(ENV_MAX_CONCURRENT_PROPAGATIONS) {
            Some(raw) => parse_positive(ENV_MAX_CONCURRENT_PROPAGATIONS, &raw)?,
            None => defaults.max_concurrent_propagations,
        };

        let log_filter = lookup(ENV_LOG_FILTER)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .unwrap_or(defaults.log_filter);

        Ok(Self {
            propagation_timeout_secs,
            max_concurrent_propagations,
            log_filter,
        })
    }

    /// Per-resource propagation timeout.
    pub fn propagation_timeout(&self) -> Duration {
        Duration::from_secs(self.propagation_timeout_secs)
    }

    #[must_use]
    pub fn with_propagation_timeout_secs(mut self, secs: u64) -> Self {
        self.propagation_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_max_concurrent_propagations(mut self, max: usize) -> Self {
        self.max_concurrent_propagations = max;
        self
    }
}

fn parse_positive<T>(var: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
    T::Err: std::fmt::Display,
{
    let value: T = raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: var.to_string(),
        message: e.to_string(),
    })?;
    if value == T::default() {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

//! Structured JSON logging setup using tracing.
//!
//! Library code only emits `tracing` events; the embedding process calls
//! [`init_logging`] once at startup. Audit entries go to the `audit` target
//! and can be routed separately with a filter directive such as
//! `info,audit=info`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{ConfigError, ENV_LOG_FILTER};

/// Install a JSON subscriber.
///
/// `RUST_LOG` wins over `filter` when set. Fails if the directive is invalid
/// or a global subscriber is already installed.
pub fn init_logging(filter: &str) -> Result<(), ConfigError> {
    let filter_layer = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .map_err(|e| ConfigError::InvalidValue {
            var: ENV_LOG_FILTER.to_string(),
            message: e.to_string(),
        })?;

    let fmt_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter_layer)
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            var: ENV_LOG_FILTER.to_string(),
            message: e.to_string(),
        })?;

    tracing::info!(filter = %filter, "Logging initialized");
    Ok(())
}

/// Initialize logging for tests. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("debug")
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_test_logging_does_not_panic() {
        init_test_logging();
        init_test_logging();
    }
}

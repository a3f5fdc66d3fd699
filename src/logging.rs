//! Tracing subscriber bootstrap.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{PricewiseError, Result};

/// Resolve the active filter: `RUST_LOG` if set, else the configured one.
///
/// # Errors
///
/// Returns [`PricewiseError::Logging`] if the configured directive is invalid.
pub fn filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.filter)
        .map_err(|e| PricewiseError::Logging(format!("invalid filter {:?}: {e}", config.filter)))
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// machine-readable.
///
/// # Errors
///
/// Returns [`PricewiseError::Logging`] if the filter is invalid or a global
/// subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(config)?)
        .with_writer(std::io::stderr);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| PricewiseError::Logging(e.to_string()))
}

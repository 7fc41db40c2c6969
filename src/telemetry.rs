//! Tracing subscriber setup for binaries and demos embedding the engine

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::TelemetryConfig;
use crate::types::{ReconError, ReconResult};

/// Install a global subscriber. `RUST_LOG` wins over the configured level
/// when set.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> ReconResult<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            ReconError::Validation(format!("Invalid log level '{}': {}", config.log_level, e))
        })?,
    };

    let json_layer = config
        .json
        .then(|| fmt::layer().json().flatten_event(true).with_target(true));
    let plain_layer = (!config.json).then(|| fmt::layer().with_target(false));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(plain_layer)
        .try_init()
        .map_err(|e| ReconError::Storage(format!("Failed to install tracing subscriber: {}", e)))
}

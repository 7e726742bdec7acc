//! Structured logging.
//!
//! `RUST_LOG` wins over the configured level so operators can raise verbosity
//! without editing the config file.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(config: &ObservabilityConfig) -> String {
    format!("file_relay={level},tower_http={level}", level = config.log_level)
}

/// Install the global tracing subscriber.
pub fn init(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directives(config).into());

    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(pretty)
        .with(json)
        .try_init()
}

//! Structured logging setup.
//!
//! Thin wrapper over `tracing-subscriber`: the engine itself only emits
//! `tracing` events; hosts that want output call [`init`] once at startup
//! (or install their own subscriber instead).

use crate::config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install a global subscriber according to the logging configuration.
///
/// `RUST_LOG` overrides the configured level when set. Calling this twice is
/// a no-op (the second subscriber fails to install and is discarded).
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if result.is_ok() {
        tracing::info!(app = %config.app_name, "logging initialized");
    }
}

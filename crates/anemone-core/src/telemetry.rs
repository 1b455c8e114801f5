//! Tracing setup
//!
//! The runtime logs through `tracing`. Binaries and tests that want output
//! install a subscriber with `init_telemetry`.

use crate::error::{Error, Result};

/// Default service name attached to the startup event
const SERVICE_NAME_DEFAULT: &str = "anemone";

/// Default filter when `RUST_LOG` is unset
const LOG_LEVEL_DEFAULT: &str = "info";

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name recorded when telemetry starts
    pub service_name: String,
    /// Whether to write events to stdout
    pub stdout_enabled: bool,
    /// Log level filter directive
    pub log_level: String,
    /// Include span targets in formatted output
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: SERVICE_NAME_DEFAULT.to_string(),
            stdout_enabled: true,
            log_level: LOG_LEVEL_DEFAULT.to_string(),
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create a new configuration with the given service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Disable stdout output
    pub fn without_stdout(mut self) -> Self {
        self.stdout_enabled = false;
        self
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Hide targets in formatted output
    pub fn without_target(mut self) -> Self {
        self.with_target = false;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - `ANEMONE_SERVICE_NAME`: service name (default: "anemone")
    /// - `RUST_LOG`: log level filter (default: "info")
    pub fn from_env() -> Self {
        let service_name = std::env::var("ANEMONE_SERVICE_NAME")
            .unwrap_or_else(|_| SERVICE_NAME_DEFAULT.to_string());
        let log_level =
            std::env::var("RUST_LOG").unwrap_or_else(|_| LOG_LEVEL_DEFAULT.to_string());

        Self {
            service_name,
            log_level,
            ..Default::default()
        }
    }
}

/// Install a global tracing subscriber
///
/// Fails if a global subscriber is already set.
///
/// ```rust,ignore
/// use anemone_core::telemetry::{init_telemetry, TelemetryConfig};
///
/// init_telemetry(TelemetryConfig::from_env())?;
/// ```
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| Error::invalid_configuration("log_level", e.to_string()))?;

    let fmt_layer = if config.stdout_enabled {
        Some(tracing_subscriber::fmt::layer().with_target(config.with_target))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| Error::internal(format!("failed to initialize tracing subscriber: {}", e)))?;

    tracing::info!(service = %config.service_name, "Telemetry initialized");
    Ok(())
}

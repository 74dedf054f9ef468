//! Logging bootstrap
//!
//! TigerStyle: Explicit telemetry configuration, installed once per process.
//!
//! Grotto itself only emits `tracing` events. Binaries and tests that want to
//! see them call [`init_telemetry`], which installs a `tracing-subscriber`
//! fmt layer filtered by `RUST_LOG` (falling back to the configured level).

use crate::error::{Error, Result};

/// Default log filter when `RUST_LOG` is unset
pub const TELEMETRY_LOG_LEVEL_DEFAULT: &str = "info";

/// Telemetry configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Whether to write events to stdout
    pub stdout_enabled: bool,
    /// Log level filter used when `RUST_LOG` is unset
    pub log_level: String,
    /// Whether to emit ANSI colour codes
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "grotto".to_string(),
            stdout_enabled: true,
            log_level: TELEMETRY_LOG_LEVEL_DEFAULT.to_string(),
            ansi: true,
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

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Disable stdout output
    pub fn without_stdout(mut self) -> Self {
        self.stdout_enabled = false;
        self
    }

    /// Disable ANSI colour codes
    pub fn without_ansi(mut self) -> Self {
        self.ansi = false;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - `GROTTO_SERVICE_NAME`: Service name (default: "grotto")
    /// - `RUST_LOG`: Log level filter (default: "info")
    pub fn from_env() -> Self {
        let service_name =
            std::env::var("GROTTO_SERVICE_NAME").unwrap_or_else(|_| "grotto".to_string());
        let log_level = std::env::var("RUST_LOG")
            .unwrap_or_else(|_| TELEMETRY_LOG_LEVEL_DEFAULT.to_string());

        Self {
            service_name,
            log_level,
            ..Default::default()
        }
    }
}

/// Install the global tracing subscriber
///
/// # Errors
/// Returns `Error::Internal` if the filter does not parse or a global
/// subscriber is already installed.
pub fn init_telemetry(config: TelemetryConfig) -> Result<()> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            Error::internal(format!("invalid log filter '{}': {}", config.log_level, e))
        })?,
    };

    let fmt_layer = if config.stdout_enabled {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_ansi(config.ansi),
        )
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "grotto");
        assert!(config.stdout_enabled);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_telemetry_config_builder() {
        let config = TelemetryConfig::new("node-a")
            .with_log_level("grotto_cluster=debug")
            .without_stdout()
            .without_ansi();

        assert_eq!(config.service_name, "node-a");
        assert_eq!(config.log_level, "grotto_cluster=debug");
        assert!(!config.stdout_enabled);
        assert!(!config.ansi);
    }

    #[test]
    fn test_init_twice_fails() {
        let config = TelemetryConfig::new("test").without_stdout();
        // First install may race with other tests in this binary; the second
        // one always finds a subscriber in place.
        let _ = init_telemetry(config.clone());
        assert!(init_telemetry(config).is_err());
    }
}

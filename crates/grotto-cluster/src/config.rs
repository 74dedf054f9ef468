//! Cluster configuration
//!
//! TigerStyle: Explicit configuration with bounded values.

use crate::error::{ClusterError, ClusterResult};
use grotto_core::constants::{
    CLUSTER_NAME_LENGTH_BYTES_MAX, REQUEST_TIMEOUT_MS_DEFAULT, REQUEST_TIMEOUT_MS_MAX,
    RPC_CONNECT_TIMEOUT_MS_DEFAULT, RPC_MESSAGE_SIZE_BYTES_MAX, SHUTDOWN_DRAIN_MS_DEFAULT,
    SHUTDOWN_DRAIN_MS_MAX,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default advertised host
pub const CLUSTER_HOST_DEFAULT: &str = "127.0.0.1";

/// Default advertised port (0 lets the transport pick)
pub const CLUSTER_PORT_DEFAULT: u16 = 0;

/// Transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Largest accepted frame payload in bytes
    pub max_message_size_bytes: usize,
    /// Outbound connection timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_size_bytes: RPC_MESSAGE_SIZE_BYTES_MAX,
            connect_timeout_ms: RPC_CONNECT_TIMEOUT_MS_DEFAULT,
        }
    }
}

impl TransportConfig {
    /// Outbound connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Cluster configuration
///
/// Captured when the cluster is created and validated on start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Name of the cluster this member joins
    pub cluster_name: String,
    /// Host advertised to peers
    pub host: String,
    /// Port to listen on; 0 picks a free port
    pub port: u16,
    /// Identity-resolution request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Wait after deregistration during graceful shutdown, in milliseconds
    pub shutdown_drain_ms: u64,
    /// Status metadata registered with the membership provider
    pub initial_member_status: serde_json::Value,
    /// Transport settings
    pub transport: TransportConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            cluster_name: String::new(),
            host: CLUSTER_HOST_DEFAULT.to_string(),
            port: CLUSTER_PORT_DEFAULT,
            request_timeout_ms: REQUEST_TIMEOUT_MS_DEFAULT,
            shutdown_drain_ms: SHUTDOWN_DRAIN_MS_DEFAULT,
            initial_member_status: serde_json::Value::Null,
            transport: TransportConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Create a configuration for the named cluster
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            ..Default::default()
        }
    }

    /// Set the advertised host and listen port
    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the request timeout
    pub fn with_request_timeout(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    /// Set the graceful shutdown drain
    pub fn with_shutdown_drain(mut self, drain_ms: u64) -> Self {
        self.shutdown_drain_ms = drain_ms;
        self
    }

    /// Set the status metadata registered at start
    pub fn with_initial_member_status(mut self, status: serde_json::Value) -> Self {
        self.initial_member_status = status;
        self
    }

    /// Set transport settings
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Shutdown drain as Duration
    pub fn shutdown_drain(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> ClusterResult<()> {
        if self.cluster_name.is_empty() {
            return Err(ClusterError::invalid_config(
                "cluster_name",
                "must not be empty",
            ));
        }
        if self.cluster_name.len() > CLUSTER_NAME_LENGTH_BYTES_MAX {
            return Err(ClusterError::invalid_config(
                "cluster_name",
                format!(
                    "length {} exceeds limit {}",
                    self.cluster_name.len(),
                    CLUSTER_NAME_LENGTH_BYTES_MAX
                ),
            ));
        }

        if self.host.is_empty() {
            return Err(ClusterError::invalid_config("host", "must not be empty"));
        }

        if self.request_timeout_ms == 0 {
            return Err(ClusterError::invalid_config(
                "request_timeout_ms",
                "must be positive",
            ));
        }
        if self.request_timeout_ms > REQUEST_TIMEOUT_MS_MAX {
            return Err(ClusterError::invalid_config(
                "request_timeout_ms",
                format!("exceeds limit {}", REQUEST_TIMEOUT_MS_MAX),
            ));
        }

        if self.shutdown_drain_ms > SHUTDOWN_DRAIN_MS_MAX {
            return Err(ClusterError::invalid_config(
                "shutdown_drain_ms",
                format!("exceeds limit {}", SHUTDOWN_DRAIN_MS_MAX),
            ));
        }

        if self.transport.max_message_size_bytes == 0
            || self.transport.max_message_size_bytes > RPC_MESSAGE_SIZE_BYTES_MAX
        {
            return Err(ClusterError::invalid_config(
                "transport.max_message_size_bytes",
                format!("must be in 1..={}", RPC_MESSAGE_SIZE_BYTES_MAX),
            ));
        }
        if self.transport.connect_timeout_ms == 0 {
            return Err(ClusterError::invalid_config(
                "transport.connect_timeout_ms",
                "must be positive",
            ));
        }

        Ok(())
    }
}

impl ClusterConfig {
    /// Create configuration for testing with short timeouts
    pub fn for_testing() -> Self {
        Self {
            cluster_name: "grotto-test".to_string(),
            host: CLUSTER_HOST_DEFAULT.to_string(),
            port: 0,
            request_timeout_ms: 1000,
            shutdown_drain_ms: 50,
            initial_member_status: serde_json::Value::Null,
            transport: TransportConfig {
                connect_timeout_ms: 500,
                ..TransportConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = ClusterConfig::default();
        assert_eq!(config.request_timeout_ms, REQUEST_TIMEOUT_MS_DEFAULT);
        assert_eq!(config.shutdown_drain(), Duration::from_millis(2000));
        // A cluster name is required
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = ClusterConfig::new("prod")
            .with_address("10.0.0.1", 4020)
            .with_request_timeout(250)
            .with_shutdown_drain(0)
            .with_initial_member_status(serde_json::json!({"zone": "a"}));

        assert_eq!(config.host, "10.0.0.1");
        assert_eq!(config.port, 4020);
        assert_eq!(config.request_timeout(), Duration::from_millis(250));
        assert_eq!(config.shutdown_drain(), Duration::ZERO);
        assert_eq!(config.initial_member_status["zone"], "a");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(ClusterConfig::for_testing().validate().is_ok());

        let invalid = ClusterConfig::for_testing().with_request_timeout(0);
        assert!(matches!(
            invalid.validate(),
            Err(ClusterError::InvalidConfig { ref field, .. }) if field == "request_timeout_ms"
        ));

        let invalid = ClusterConfig::for_testing().with_address("", 0);
        assert!(invalid.validate().is_err());

        let invalid = ClusterConfig::for_testing().with_shutdown_drain(SHUTDOWN_DRAIN_MS_MAX + 1);
        assert!(invalid.validate().is_err());

        let invalid = ClusterConfig::for_testing().with_transport(TransportConfig {
            max_message_size_bytes: 0,
            ..TransportConfig::default()
        });
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: ClusterConfig =
            serde_json::from_str(r#"{"cluster_name": "prod", "port": 4020}"#).unwrap();
        assert_eq!(config.cluster_name, "prod");
        assert_eq!(config.port, 4020);
        assert_eq!(config.host, CLUSTER_HOST_DEFAULT);
        assert_eq!(config.request_timeout_ms, REQUEST_TIMEOUT_MS_DEFAULT);
        assert_eq!(config.transport, TransportConfig::default());
    }
}

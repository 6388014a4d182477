//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct RelayConfig {
    /// HTTP front end settings.
    pub http: HttpConfig,

    /// Tunnel listener settings.
    pub tunnel: TunnelConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP front end configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
    /// Serve the dispatcher over plain HTTP.
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Tunnel listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TunnelConfig {
    /// Accept tunnel sessions.
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:7070").
    pub bind_address: String,

    /// Maximum concurrent tunnel sessions (backpressure).
    pub max_connections: usize,

    /// Largest frame accepted or sent, in bytes (excluding the length prefix).
    pub max_frame_bytes: usize,

    /// Requests one session may have in flight before reading pauses.
    pub max_in_flight: usize,

    /// How long shutdown waits for open sessions to drain.
    pub drain_timeout_secs: u64,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:7070".to_string(),
            max_connections: 1024,
            max_frame_bytes: 1024 * 1024,
            max_in_flight: 128,
            drain_timeout_secs: 10,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request dispatch deadline in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error), overridden by RUST_LOG.
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub log_json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: RelayConfig = toml::from_str(
            r#"
            [tunnel]
            bind_address = "127.0.0.1:9000"

            [observability]
            log_json = true
            "#,
        )
        .unwrap();

        assert_eq!(config.tunnel.bind_address, "127.0.0.1:9000");
        assert_eq!(config.tunnel.max_connections, 1024);
        assert_eq!(config.tunnel.max_in_flight, 128);
        assert!(config.observability.log_json);
        assert_eq!(config.observability.log_level, "info");
        assert_eq!(config.http, HttpConfig::default());
    }
}

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the forward proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection cap).
    pub listener: ListenerConfig,

    /// Per-phase deadlines.
    pub timeouts: TimeoutConfig,

    /// Size limits and transfer buffer size.
    pub limits: LimitsConfig,

    /// Host header fragmentation settings.
    pub obfuscation: ObfuscationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Timeout configuration for each connection phase, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Outbound connection establishment.
    pub connect_secs: u64,

    /// Receipt of the complete header block.
    pub header_secs: u64,

    /// Receipt of the Content-Length body.
    pub body_secs: u64,

    /// Silence allowed on a response stream or an open tunnel.
    pub idle_secs: u64,

    /// How long shutdown waits for in-flight connections.
    pub shutdown_grace_secs: u64,
}

impl TimeoutConfig {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn header(&self) -> Duration {
        Duration::from_secs(self.header_secs)
    }

    pub fn body(&self) -> Duration {
        Duration::from_secs(self.body_secs)
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            header_secs: 30,
            body_secs: 60,
            idle_secs: 300,
            shutdown_grace_secs: 10,
        }
    }
}

/// Request size limits.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum header block size, terminator included.
    pub max_header_bytes: usize,

    /// Maximum Content-Length accepted from a client.
    pub max_body_bytes: usize,

    /// Size of every bounded read in the transfer loops.
    pub buffer_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_body_bytes: 8 * 1024 * 1024, // 8MB
            buffer_size: 1024,
        }
    }
}

/// Host header fragmentation.
///
/// The first fragment carries `first_chunk` characters; every later fragment
/// carries a size drawn from `chunk_min..chunk_max`. Each fragment is preceded
/// by a delay drawn from `delay_min_ms..delay_max_ms`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObfuscationConfig {
    /// Send the Host value in fragments. When false it is written in one piece.
    pub enabled: bool,

    pub first_chunk: usize,

    /// Inclusive lower bound of later fragment sizes.
    pub chunk_min: usize,

    /// Exclusive upper bound of later fragment sizes.
    pub chunk_max: usize,

    /// Inclusive lower bound of the inter-fragment delay.
    pub delay_min_ms: u64,

    /// Exclusive upper bound of the inter-fragment delay.
    pub delay_max_ms: u64,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            first_chunk: 1,
            chunk_min: 2,
            chunk_max: 5,
            delay_min_ms: 2,
            delay_max_ms: 4,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "0.0.0.0:3128"

            [obfuscation]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "0.0.0.0:3128");
        assert_eq!(config.listener.max_connections, 10_000);
        assert!(!config.obfuscation.enabled);
        assert_eq!(config.obfuscation.chunk_max, 5);
        assert_eq!(config.timeouts, TimeoutConfig::default());
    }

    #[test]
    fn log_format_is_lowercase() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }
}

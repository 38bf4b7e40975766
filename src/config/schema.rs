//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the backend.
//! All types derive Serde traits for deserialization from config files.

use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Root configuration for the blog backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (host, port).
    pub listener: ListenerConfig,

    /// Log level and output format.
    pub log: LogConfig,

    /// Settings passed through to the user store.
    pub database: DatabaseConfig,

    /// Echo handler failure messages to the client instead of a generic body.
    pub errors_in_response: bool,

    /// Per-client rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request and credential hardening.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            log: LogConfig::default(),
            database: DatabaseConfig::default(),
            errors_in_response: false,
            rate_limit: RateLimitConfig::default(),
            timeouts: TimeoutConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (e.g., "0.0.0.0").
    pub host: String,

    /// TCP port.
    pub port: u16,
}

impl ListenerConfig {
    /// The `host:port` string handed to the TCP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Human readable single-line output.
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level when `RUST_LOG` is unset ("debug", "info", "warn", "error").
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

/// Persistence collaborator settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Log every store query at info level.
    pub log_queries: bool,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Tokens refilled per second for each client.
    pub ip_rate_limit: f64,

    /// Bucket capacity (burst size).
    pub burst_rate_limit: u32,

    /// Maximum number of tracked clients before the least recently seen is evicted.
    pub max_clients: usize,

    /// Interval between idle-bucket sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            ip_rate_limit: 10.0,
            burst_rate_limit: 20,
            max_clients: 100_000,
            sweep_interval_secs: 60,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline attached to every handler's execution context, in seconds.
    pub handler_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { handler_secs: 10 }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Salt length in bytes for new credentials.
    pub salt_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
            salt_size: 16,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Expose a Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Address of the Prometheus scrape endpoint.
    pub metrics_address: String,
}

impl ObservabilityConfig {
    pub fn metrics_socket_addr(&self) -> Option<SocketAddr> {
        self.metrics_address.parse().ok()
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

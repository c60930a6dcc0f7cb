//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limit).
    pub listener: ListenerConfig,

    /// Dedicated backend for upgrade (WebSocket) sessions.
    pub upgrade: UpgradeConfig,

    /// Route definitions mapping requests to forward targets.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request head limits enforced by the serving layer.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            upgrade: UpgradeConfig::default(),
            routes: default_routes(),
            timeouts: TimeoutConfig::default(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:1330").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:1330".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Upgrade session configuration.
///
/// Upgrade sessions are dialed as raw TCP connections, so the backend is a
/// `host:port` pair rather than a URL. It may differ from every forward
/// target.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Backend address for upgrade sessions (e.g., "127.0.0.1:8080").
    pub backend_address: String,

    /// Protocol token expected in the `Upgrade` header.
    pub protocol: String,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            backend_address: "127.0.0.1:8080".to_string(),
            protocol: "websocket".to_string(),
        }
    }
}

/// Route configuration mapping requests to a forward target.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Forward target URL (scheme + authority, e.g. "http://localhost:3000").
    pub target: String,

    /// Strip the matched `path_prefix` before forwarding.
    #[serde(default)]
    pub strip_prefix: bool,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

fn default_routes() -> Vec<RouteConfig> {
    vec![RouteConfig {
        name: "default".to_string(),
        host: None,
        path_prefix: None,
        target: "http://localhost:3000".to_string(),
        strip_prefix: false,
        priority: 0,
    }]
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Backend connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Forwarded request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time allowed for a client to send a complete request head, in seconds.
    pub header_read_secs: u64,

    /// Time allowed for open connections to finish after shutdown, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            header_read_secs: 30,
            drain_secs: 10,
        }
    }
}

/// Limits applied while reading request heads.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum size of a request head in bytes.
    pub max_header_bytes: usize,

    /// Maximum number of request headers.
    pub max_headers: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_header_bytes: 64 * 1024,
            max_headers: 100,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
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
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_deployment() {
        let config = ProxyConfig::default();
        assert_eq!(config.listener.bind_address, "0.0.0.0:1330");
        assert_eq!(config.upgrade.backend_address, "127.0.0.1:8080");
        assert_eq!(config.upgrade.protocol, "websocket");
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].target, "http://localhost:3000");
    }

    #[test]
    fn empty_document_gets_catch_all_route() {
        let config: ProxyConfig = toml::from_str("").unwrap();
        assert_eq!(config.routes.len(), 1);
        assert_eq!(config.routes[0].target, "http://localhost:3000");
    }

    #[test]
    fn parses_partial_document() {
        let config: ProxyConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9000"

            [upgrade]
            backend_address = "10.0.0.2:9001"

            [observability]
            log_format = "json"

            [[routes]]
            name = "api"
            path_prefix = "/api"
            target = "http://10.0.0.3:8000"
            strip_prefix = true
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.bind_address, "127.0.0.1:9000");
        assert_eq!(config.listener.max_connections, 10_000);
        assert_eq!(config.upgrade.backend_address, "10.0.0.2:9001");
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.routes.len(), 1);
        assert!(config.routes[0].strip_prefix);
    }
}

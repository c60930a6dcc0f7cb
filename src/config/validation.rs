//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and target URLs
//! - Validate value ranges (timeouts > 0, limits > 0)
//! - Detect duplicate route names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidSocketAddr { field: &'static str, value: String },

    #[error("upgrade.backend_address: expected host:port, got {0:?}")]
    InvalidBackendAddress(String),

    #[error("route {route:?}: invalid target {target:?}: {reason}")]
    InvalidTarget {
        route: String,
        target: String,
        reason: String,
    },

    #[error("route {route:?}: path_prefix must start with '/'")]
    InvalidPathPrefix { route: String },

    #[error("route {route:?}: strip_prefix requires path_prefix")]
    StripWithoutPrefix { route: String },

    #[error("route {0:?}: duplicate route name")]
    DuplicateRoute(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("upgrade.protocol must not be empty")]
    EmptyProtocol,
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidSocketAddr {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }

    if !is_host_port(&config.upgrade.backend_address) {
        errors.push(ValidationError::InvalidBackendAddress(
            config.upgrade.backend_address.clone(),
        ));
    }
    if config.upgrade.protocol.trim().is_empty() {
        errors.push(ValidationError::EmptyProtocol);
    }

    let mut names = HashSet::new();
    for route in &config.routes {
        if !names.insert(route.name.as_str()) {
            errors.push(ValidationError::DuplicateRoute(route.name.clone()));
        }
        if let Err(reason) = check_target(&route.target) {
            errors.push(ValidationError::InvalidTarget {
                route: route.name.clone(),
                target: route.target.clone(),
                reason,
            });
        }
        match &route.path_prefix {
            Some(prefix) if !prefix.starts_with('/') => {
                errors.push(ValidationError::InvalidPathPrefix {
                    route: route.name.clone(),
                });
            }
            None if route.strip_prefix => {
                errors.push(ValidationError::StripWithoutPrefix {
                    route: route.name.clone(),
                });
            }
            _ => {}
        }
    }

    let timeouts = &config.timeouts;
    for (field, value) in [
        ("timeouts.connect_secs", timeouts.connect_secs),
        ("timeouts.request_secs", timeouts.request_secs),
        ("timeouts.header_read_secs", timeouts.header_read_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    if config.limits.max_header_bytes == 0 {
        errors.push(ValidationError::Zero("limits.max_header_bytes"));
    }
    if config.limits.max_headers == 0 {
        errors.push(ValidationError::Zero("limits.max_headers"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidSocketAddr {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` with a non-empty host and a numeric port.
fn is_host_port(value: &str) -> bool {
    match value.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

fn check_target(target: &str) -> Result<(), String> {
    let url = Url::parse(target).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme {:?}", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    Ok(())
}

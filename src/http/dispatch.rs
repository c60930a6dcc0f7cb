//! Per-request routing decision.
//!
//! # Responsibilities
//! - Resolve the target through the injected `TargetResolver`
//! - Pick the upgrade path or the standard forwarding path
//! - Fail requests with no target instead of guessing
//!
//! # Design Decisions
//! - Upgrade sessions go to one dedicated backend address, which may differ
//!   from every forward target
//! - Resolution runs first for both paths, so an unroutable upgrade request
//!   gets 404 just like an unroutable plain request

use std::sync::Arc;

use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode};
use thiserror::Error;

use crate::config::UpgradeConfig;
use crate::http::detect;
use crate::observability::metrics;
use crate::routing::{TargetDescriptor, TargetResolver};

/// Where an upgrade session is dialed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeTarget {
    /// Route that accepted the request.
    pub route: String,
    /// Backend `host:port`.
    pub address: String,
}

/// Outcome of [`RequestDispatcher::route`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Forward through the standard reverse-proxy path.
    Forward(TargetDescriptor),
    /// Take over the connection and tunnel it.
    Upgrade(UpgradeTarget),
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler found for {method} {path}")]
    NoTarget { method: Method, path: String },
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NoTarget { .. } => StatusCode::NOT_FOUND,
        }
    }
}

/// Top-level routing entry point.
pub struct RequestDispatcher {
    resolver: Arc<dyn TargetResolver>,
    upgrade_address: String,
    protocol: String,
}

impl RequestDispatcher {
    pub fn new(resolver: Arc<dyn TargetResolver>, upgrade: &UpgradeConfig) -> Self {
        Self {
            resolver,
            upgrade_address: upgrade.backend_address.clone(),
            protocol: upgrade.protocol.clone(),
        }
    }

    /// Whether these headers select the upgrade path.
    pub fn is_upgrade(&self, headers: &HeaderMap) -> bool {
        detect::is_upgrade_to(headers, &self.protocol)
    }

    /// Decide how to serve a request.
    pub fn route(&self, head: &Parts) -> Result<RoutingDecision, DispatchError> {
        let Some(target) = self.resolver.resolve(head) else {
            tracing::warn!(
                method = %head.method,
                path = %head.uri.path(),
                "Couldn't find any handler"
            );
            metrics::record_decision("not_found");
            return Err(DispatchError::NoTarget {
                method: head.method.clone(),
                path: head.uri.path().to_string(),
            });
        };

        if self.is_upgrade(&head.headers) {
            tracing::debug!(route = %target.route(), backend = %self.upgrade_address, "Upgrade request");
            metrics::record_decision("upgrade");
            return Ok(RoutingDecision::Upgrade(UpgradeTarget {
                route: target.route().to_string(),
                address: self.upgrade_address.clone(),
            }));
        }

        metrics::record_decision("forward");
        Ok(RoutingDecision::Forward(target))
    }
}

impl std::fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("upgrade_address", &self.upgrade_address)
            .field("protocol", &self.protocol)
            .finish_non_exhaustive()
    }
}

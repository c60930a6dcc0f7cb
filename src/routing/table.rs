//! Static route table resolver.
//!
//! # Responsibilities
//! - Compile `RouteConfig`s into matchers + target descriptors
//! - Look up the first matching route for a request head
//! - Swap in a new table on configuration reload
//!
//! # Design Decisions
//! - Routes sorted by priority (descending), config order breaks ties
//! - The table is immutable; reloads replace it wholesale through `ArcSwap`
//!   so lookups never take a lock
//! - No implicit catch-all: a request matching no route resolves to `None`

use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::request::Parts;
use url::Url;

use crate::config::RouteConfig;
use crate::routing::matcher::{AndMatcher, HostMatcher, Matcher, PathPrefixMatcher};
use crate::routing::resolver::{TargetDescriptor, TargetResolver};

/// A route ready for matching.
#[derive(Debug)]
struct CompiledRoute {
    matcher: AndMatcher,
    target: TargetDescriptor,
}

/// An immutable, priority-ordered set of routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    /// Compile routes from configuration.
    ///
    /// Routes whose target is not a valid URL are skipped with an error log;
    /// validation normally rejects them before they get here.
    pub fn from_config(mut configs: Vec<RouteConfig>) -> Self {
        configs.sort_by(|a, b| b.priority.cmp(&a.priority));

        let routes = configs
            .into_iter()
            .filter_map(|config| {
                let forward = match Url::parse(&config.target) {
                    Ok(url) => url,
                    Err(e) => {
                        tracing::error!(route = %config.name, target = %config.target, error = %e, "Skipping route with invalid target");
                        return None;
                    }
                };

                let mut matchers: Vec<Box<dyn Matcher>> = Vec::new();
                if let Some(host) = &config.host {
                    matchers.push(Box::new(HostMatcher::new(host.clone())));
                }
                let mut target = TargetDescriptor::new(config.name, forward);
                if let Some(prefix) = config.path_prefix {
                    matchers.push(Box::new(PathPrefixMatcher::new(prefix.clone())));
                    if config.strip_prefix {
                        target = target.with_strip_prefix(prefix);
                    }
                }

                Some(CompiledRoute {
                    matcher: AndMatcher::new(matchers),
                    target,
                })
            })
            .collect();

        Self { routes }
    }

    /// First matching route's target.
    pub fn lookup(&self, head: &Parts) -> Option<&TargetDescriptor> {
        self.routes
            .iter()
            .find(|route| route.matcher.matches(head))
            .map(|route| &route.target)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// Resolver backed by a reloadable [`RouteTable`].
#[derive(Debug)]
pub struct StaticTableResolver {
    table: ArcSwap<RouteTable>,
}

impl StaticTableResolver {
    pub fn new(table: RouteTable) -> Self {
        Self {
            table: ArcSwap::from_pointee(table),
        }
    }

    pub fn from_config(routes: Vec<RouteConfig>) -> Self {
        Self::new(RouteTable::from_config(routes))
    }

    /// Atomically replace the route table. In-flight lookups keep the old one.
    ///
    /// Returns the number of routes installed.
    pub fn replace(&self, routes: Vec<RouteConfig>) -> usize {
        let table = RouteTable::from_config(routes);
        let count = table.len();
        if table.is_empty() {
            tracing::warn!("Route table replaced with no routes, every request will get 404");
        } else {
            tracing::info!(routes = count, "Route table replaced");
        }
        self.table.store(Arc::new(table));
        count
    }
}

impl TargetResolver for StaticTableResolver {
    fn resolve(&self, head: &Parts) -> Option<TargetDescriptor> {
        self.table.load().lookup(head).cloned()
    }
}

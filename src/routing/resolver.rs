//! Target resolution.
//!
//! # Responsibilities
//! - Define the `TargetResolver` seam the dispatcher depends on
//! - Describe a resolved forward target (`TargetDescriptor`)
//! - Rewrite request URIs for the forward path
//!
//! # Design Decisions
//! - Resolution is synchronous and side-effect free; implementations that
//!   consult an external directory keep their own cache
//! - `None` means "no target"; callers must not substitute a default

use std::fmt;

use axum::http::request::Parts;
use axum::http::uri::{PathAndQuery, Uri};
use url::{Position, Url};

/// Maps an inbound request head to a backend.
pub trait TargetResolver: Send + Sync {
    /// Resolve the target for a request, or `None` if nothing matches.
    fn resolve(&self, head: &Parts) -> Option<TargetDescriptor>;
}

/// Adapter turning a closure into a [`TargetResolver`].
pub struct FnResolver<F>(pub F);

impl<F> TargetResolver for FnResolver<F>
where
    F: Fn(&Parts) -> Option<TargetDescriptor> + Send + Sync,
{
    fn resolve(&self, head: &Parts) -> Option<TargetDescriptor> {
        (self.0)(head)
    }
}

impl<F> fmt::Debug for FnResolver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnResolver")
    }
}

/// A resolved forward target. Immutable, one per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    route: String,
    forward: Url,
    strip_prefix: Option<String>,
}

impl TargetDescriptor {
    /// Create a descriptor forwarding to `forward` (scheme + authority, optional base path).
    pub fn new(route: impl Into<String>, forward: Url) -> Self {
        Self {
            route: route.into(),
            forward,
            strip_prefix: None,
        }
    }

    /// Strip `prefix` from request paths before forwarding.
    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    /// Name of the route that produced this target.
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Forward URL.
    pub fn forward(&self) -> &Url {
        &self.forward
    }

    /// `host[:port]` exactly as configured.
    pub fn authority(&self) -> &str {
        &self.forward[Position::BeforeHost..Position::AfterPort]
    }

    /// Build the upstream URI for an inbound request URI.
    pub fn rewrite_uri(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path = uri.path();
        let path = match &self.strip_prefix {
            Some(prefix) => path.strip_prefix(prefix.as_str()).unwrap_or(path),
            None => path,
        };

        let base = self.forward.path().trim_end_matches('/');
        let mut joined = String::with_capacity(base.len() + path.len() + 1);
        joined.push_str(base);
        if !path.starts_with('/') {
            joined.push('/');
        }
        joined.push_str(path);
        if let Some(query) = uri.query() {
            joined.push('?');
            joined.push_str(query);
        }

        Ok(Uri::builder()
            .scheme(self.forward.scheme())
            .authority(self.authority())
            .path_and_query(PathAndQuery::try_from(joined)?)
            .build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn target(url: &str) -> TargetDescriptor {
        TargetDescriptor::new("test", Url::parse(url).unwrap())
    }

    #[test]
    fn rewrites_scheme_and_authority() {
        let uri: Uri = "/chat/room?id=7".parse().unwrap();
        let out = target("http://localhost:3000").rewrite_uri(&uri).unwrap();
        assert_eq!(out.to_string(), "http://localhost:3000/chat/room?id=7");
    }

    #[test]
    fn strips_configured_prefix() {
        let uri: Uri = "/api/users".parse().unwrap();
        let out = target("http://10.0.0.1:8000")
            .with_strip_prefix("/api")
            .rewrite_uri(&uri)
            .unwrap();
        assert_eq!(out.to_string(), "http://10.0.0.1:8000/users");

        let uri: Uri = "/api".parse().unwrap();
        let out = target("http://10.0.0.1:8000")
            .with_strip_prefix("/api")
            .rewrite_uri(&uri)
            .unwrap();
        assert_eq!(out.path(), "/");
    }

    #[test]
    fn joins_base_path() {
        let uri: Uri = "/x".parse().unwrap();
        let out = target("http://backend:81/v2/").rewrite_uri(&uri).unwrap();
        assert_eq!(out.to_string(), "http://backend:81/v2/x");
    }

    #[test]
    fn authority_keeps_explicit_port() {
        assert_eq!(target("http://localhost:3000").authority(), "localhost:3000");
        assert_eq!(target("http://example.com").authority(), "example.com");
    }

    #[test]
    fn closure_resolver() {
        let resolver = FnResolver(|head: &Parts| {
            (head.uri.path() == "/known").then(|| target("http://localhost:3000"))
        });
        let (known, _) = Request::get("/known").body(()).unwrap().into_parts();
        let (unknown, _) = Request::get("/other").body(()).unwrap().into_parts();
        assert!(resolver.resolve(&known).is_some());
        assert!(resolver.resolve(&unknown).is_none());
    }
}

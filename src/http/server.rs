//! HTTP server setup and connection serving.
//!
//! # Responsibilities
//! - Accept connections under the listener's connection limit
//! - Read the first request head of each connection and pick a path
//! - Run upgrade sessions on the raw connection (hijack capable)
//! - Hand every other connection to hyper + the axum router
//! - Apply route table reloads and drain connections on shutdown
//!
//! # Data Flow
//! ```text
//! accept ──▶ RawExchange::read_head ──┬── upgrade ──▶ dispatcher ──▶ UpgradeHandler
//!                                     │                  │
//!                                     │               404 (raw)
//!                                     └── other ──▶ PrefixedStream ──▶ hyper http1 ──▶ Router
//! ```
//!
//! # Design Decisions
//! - A connection is upgrade-capable only while the proxy still owns the
//!   raw stream; once hyper serves it, upgrade requests get 500
//! - Raw-path error responses keep the connection open when it is safe to
//!   read the next request, so a failed dial can be retried on the same socket

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    response::Response,
    routing::any,
    Router,
};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tower::Service;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::Instrument;

use crate::config::{LimitsConfig, ProxyConfig};
use crate::http::dispatch::{RequestDispatcher, RoutingDecision};
use crate::http::exchange::RawExchange;
use crate::http::forward::Forwarder;
use crate::http::head::RequestHead;
use crate::http::request::{UuidRequestId, X_REQUEST_ID};
use crate::http::response::{self, text_response};
use crate::http::upgrade::UpgradeHandler;
use crate::net::{ConnectionTracker, Listener, PrefixedStream};
use crate::routing::{StaticTableResolver, TargetResolver};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<RequestDispatcher>,
    pub upgrades: UpgradeHandler,
    pub forwarder: Forwarder,
}

/// Everything a connection task needs.
struct Shared {
    state: AppState,
    router: Router,
    limits: LimitsConfig,
    header_timeout: Duration,
}

/// Reverse proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    shared: Arc<Shared>,
    table: Option<Arc<StaticTableResolver>>,
}

impl ProxyServer {
    /// Create a server resolving targets from the configured route table.
    pub fn new(config: ProxyConfig) -> Self {
        let table = Arc::new(StaticTableResolver::from_config(config.routes.clone()));
        let mut server = Self::with_resolver(config, table.clone());
        server.table = Some(table);
        server
    }

    /// Create a server with an injected target resolver.
    ///
    /// Route reloads are ignored for injected resolvers.
    pub fn with_resolver(config: ProxyConfig, resolver: Arc<dyn TargetResolver>) -> Self {
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        let state = AppState {
            dispatcher: Arc::new(RequestDispatcher::new(resolver, &config.upgrade)),
            upgrades: UpgradeHandler::new(connect_timeout),
            forwarder: Forwarder::new(connect_timeout),
        };

        let shared = Arc::new(Shared {
            router: Self::build_router(&config, state.clone()),
            state,
            limits: config.limits.clone(),
            header_timeout: Duration::from_secs(config.timeouts.header_read_secs),
        });

        Self {
            config,
            shared,
            table: None,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server on an already-bound socket, limited to
    /// `listener.max_connections`.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let listener = Listener::from_listener(listener, self.config.listener.max_connections);
        self.serve(listener, config_updates, shutdown).await
    }

    /// Serve `listener` until `shutdown` fires, then drain open connections.
    pub async fn serve(
        self,
        listener: Listener,
        mut config_updates: mpsc::UnboundedReceiver<ProxyConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> io::Result<()> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upgrade_backend = %self.config.upgrade.backend_address,
            "Proxy server starting"
        );

        let tracker = ConnectionTracker::new();
        let (draining_tx, draining_rx) = watch::channel(false);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let guard = tracker.track();
                        let span = tracing::info_span!(
                            "connection",
                            connection_id = %guard.id(),
                            peer_addr = %peer,
                        );
                        let shared = Arc::clone(&self.shared);
                        let draining = draining_rx.clone();
                        tokio::spawn(
                            async move {
                                let _permit = permit;
                                let _guard = guard;
                                serve_connection(shared, stream, peer, draining).await;
                            }
                            .instrument(span),
                        );
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept error");
                    }
                },
                Some(config) = config_updates.recv() => self.apply(config),
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        drop(listener);
        let _ = draining_tx.send(true);

        let drain_timeout = Duration::from_secs(self.config.timeouts.drain_secs);
        let remaining = tracker.drain(drain_timeout).await;
        if remaining > 0 {
            tracing::warn!(remaining, "Drain timeout elapsed with connections still open");
        }

        tracing::info!("Proxy server stopped");
        Ok(())
    }

    /// Apply a reloaded configuration.
    fn apply(&self, config: ProxyConfig) {
        match &self.table {
            Some(table) => {
                let count = table.replace(config.routes);
                tracing::info!(routes = count, "Route table reloaded");
            }
            None => tracing::debug!("Ignoring route reload for injected resolver"),
        }
        if config.upgrade != self.config.upgrade || config.listener != self.config.listener {
            tracing::warn!("Listener and upgrade settings take effect after restart");
        }
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Serve one client connection from its first byte.
async fn serve_connection(
    shared: Arc<Shared>,
    stream: TcpStream,
    peer: SocketAddr,
    draining: watch::Receiver<bool>,
) {
    let _ = stream.set_nodelay(true);
    let mut exchange = RawExchange::new(stream);
    let dispatcher = &shared.state.dispatcher;

    loop {
        let head = match exchange.read_head(&shared.limits, shared.header_timeout).await {
            Ok(Some(head)) => head,
            Ok(None) => return,
            Err(e) => {
                tracing::debug!(error = %e, "Failed to read request head");
                if let Some(status) = e.status() {
                    let body = status.canonical_reason().unwrap_or("Bad request.");
                    let _ = exchange.respond(status, body, true).await;
                }
                return;
            }
        };

        if !dispatcher.is_upgrade(&head.parts.headers) {
            break;
        }

        let target = match dispatcher.route(&head.parts) {
            Ok(RoutingDecision::Upgrade(target)) => target,
            Ok(RoutingDecision::Forward(_)) => break,
            Err(e) => {
                if !respond_and_continue(&mut exchange, &head, e.status(), response::NOT_FOUND).await {
                    return;
                }
                continue;
            }
        };

        match shared
            .state
            .upgrades
            .handle(&head.parts, Some(&mut exchange), &target)
            .await
        {
            Ok(summary) => {
                tracing::info!(
                    route = %target.route,
                    upstream_bytes = summary.outcome.upstream_bytes,
                    downstream_bytes = summary.outcome.downstream_bytes,
                    "Upgrade session finished"
                );
                return;
            }
            Err(e) => match e.client_status() {
                Some((status, body)) => {
                    if !respond_and_continue(&mut exchange, &head, status, body).await {
                        return;
                    }
                }
                None => return,
            },
        }
    }

    if let Some(io) = exchange.into_prefixed() {
        serve_http(shared, io, peer, draining).await;
    }
}

/// Answer on the raw stream. Returns whether the next request can be read.
async fn respond_and_continue(
    exchange: &mut RawExchange,
    head: &RequestHead,
    status: StatusCode,
    body: &str,
) -> bool {
    let close = head.has_body() || head.wants_close();
    if let Err(e) = exchange.respond(status, body, close).await {
        tracing::debug!(error = %e, "Failed to write response");
        return false;
    }
    exchange.consume(head.len);
    !close
}

/// Serve the rest of a connection with hyper and the axum router.
async fn serve_http(
    shared: Arc<Shared>,
    io: PrefixedStream<TcpStream>,
    peer: SocketAddr,
    mut draining: watch::Receiver<bool>,
) {
    let router = shared.router.clone();
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().call(request)
    });

    let conn = http1::Builder::new()
        .timer(TokioTimer::new())
        .header_read_timeout(shared.header_timeout)
        .keep_alive(true)
        .serve_connection(TokioIo::new(io), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = draining.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "HTTP connection error");
    }
}

/// Catch-all handler for hyper-served requests.
async fn proxy_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let (parts, body) = request.into_parts();

    match state.dispatcher.route(&parts) {
        Ok(RoutingDecision::Forward(target)) => {
            state
                .forwarder
                .forward(Request::from_parts(parts, body), &target, peer)
                .await
        }
        Ok(RoutingDecision::Upgrade(target)) => {
            // hyper owns this connection, so dialing the backend would be wasted.
            let err = state.upgrades.reject_unhijackable(&target);
            let (status, body) = err
                .client_status()
                .unwrap_or((StatusCode::INTERNAL_SERVER_ERROR, response::HIJACK_UNSUPPORTED));
            text_response(status, body)
        }
        Err(e) => text_response(e.status(), response::NOT_FOUND),
    }
}

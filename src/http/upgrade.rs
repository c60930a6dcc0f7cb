//! Upgrade session handling.
//!
//! # Data Flow
//! ```text
//! dial backend ──▶ hijack client ──▶ replay head ──▶ tunnel::splice
//!      │                │                 │
//!      ▼                ▼                 ▼
//!   500, client     500, client      abort session,
//!   still usable    still usable     both sides dropped
//! ```
//!
//! # Design Decisions
//! - The backend is dialed before the hijack, so a dead backend can still
//!   be reported to the client through the serving layer
//! - Once hijacked, the handler owns both streams; every exit path drops them

use std::io;
use std::time::Duration;

use axum::http::request::Parts;
use axum::http::StatusCode;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::dispatch::UpgradeTarget;
use crate::http::exchange::{Hijack, HijackError};
use crate::http::response;
use crate::observability::metrics;
use crate::tunnel::{self, SpliceOutcome};

/// Errors ending an upgrade session before the relay starts.
#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("failed to connect to upgrade backend {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("serving layer cannot hand over the connection")]
    HijackUnsupported,

    #[error("hijack failed: {0}")]
    Hijack(#[from] HijackError),

    #[error("failed to replay request to {address}: {source}")]
    Replay {
        address: String,
        #[source]
        source: io::Error,
    },
}

impl UpgradeError {
    /// Response owed to the client, or `None` once the connection has
    /// left the serving layer.
    pub fn client_status(&self) -> Option<(StatusCode, &'static str)> {
        match self {
            UpgradeError::Dial { .. } => Some((
                StatusCode::INTERNAL_SERVER_ERROR,
                response::BACKEND_UNREACHABLE,
            )),
            UpgradeError::HijackUnsupported | UpgradeError::Hijack(_) => Some((
                StatusCode::INTERNAL_SERVER_ERROR,
                response::HIJACK_UNSUPPORTED,
            )),
            UpgradeError::Replay { .. } => None,
        }
    }

    /// Metric label.
    pub fn reason(&self) -> &'static str {
        match self {
            UpgradeError::Dial { .. } => "dial",
            UpgradeError::HijackUnsupported | UpgradeError::Hijack(_) => "hijack",
            UpgradeError::Replay { .. } => "replay",
        }
    }
}

/// Result of a completed session.
#[derive(Debug)]
pub struct TunnelSummary {
    pub outcome: SpliceOutcome,
    /// Bytes replayed to the backend before the relay started.
    pub replayed: usize,
}

/// Takes over upgrade requests and relays them to the upgrade backend.
#[derive(Debug, Clone)]
pub struct UpgradeHandler {
    connect_timeout: Duration,
}

impl UpgradeHandler {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    /// Run one upgrade session to completion.
    ///
    /// `hijacker` is the serving layer's hijack capability, if it has one.
    pub async fn handle(
        &self,
        head: &Parts,
        hijacker: Option<&mut dyn Hijack>,
        target: &UpgradeTarget,
    ) -> Result<TunnelSummary, UpgradeError> {
        let result = match self.dial(&target.address).await {
            Ok(backend) => self.attach(head, hijacker, target, backend).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            record_failure(target, e);
        }
        result
    }

    /// Refuse an upgrade arriving where the connection can never be
    /// hijacked. The backend is not dialed.
    pub fn reject_unhijackable(&self, target: &UpgradeTarget) -> UpgradeError {
        let err = UpgradeError::HijackUnsupported;
        record_failure(target, &err);
        err
    }

    /// Hijack the client, replay its bytes to `backend`, then relay.
    async fn attach<B>(
        &self,
        head: &Parts,
        hijacker: Option<&mut dyn Hijack>,
        target: &UpgradeTarget,
        mut backend: B,
    ) -> Result<TunnelSummary, UpgradeError>
    where
        B: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let hijacker = hijacker.ok_or(UpgradeError::HijackUnsupported)?;
        let hijacked = hijacker.hijack()?;
        let client = hijacked.stream;

        let replay_error = |source: io::Error| UpgradeError::Replay {
            address: target.address.clone(),
            source,
        };
        backend.write_all(&hijacked.replay).await.map_err(replay_error)?;
        backend.flush().await.map_err(replay_error)?;

        tracing::info!(
            route = %target.route,
            backend = %target.address,
            path = %head.uri.path(),
            replayed = hijacked.replay.len(),
            "Tunnel established"
        );
        metrics::tunnel_opened();

        let outcome = tunnel::splice(client, backend).await;
        metrics::tunnel_closed(
            outcome.upstream_bytes,
            outcome.downstream_bytes,
            outcome.elapsed,
        );

        match (&outcome.first, &outcome.error) {
            (_, Some(error)) => tracing::debug!(
                route = %target.route,
                first = ?outcome.first,
                %error,
                "Tunnel ended with error"
            ),
            (first, None) => tracing::debug!(
                route = %target.route,
                first = ?first,
                upstream_bytes = outcome.upstream_bytes,
                downstream_bytes = outcome.downstream_bytes,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                "Tunnel closed"
            ),
        }

        Ok(TunnelSummary {
            outcome,
            replayed: hijacked.replay.len(),
        })
    }

    async fn dial(&self, address: &str) -> Result<TcpStream, UpgradeError> {
        let dial_error = |source: io::Error| UpgradeError::Dial {
            address: address.to_string(),
            source,
        };
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| dial_error(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))?
            .map_err(dial_error)?;
        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

fn record_failure(target: &UpgradeTarget, e: &UpgradeError) {
    metrics::upgrade_failed(e.reason());
    match e {
        UpgradeError::Dial { .. } => {
            tracing::error!(route = %target.route, error = %e, "Error dialing websocket backend")
        }
        UpgradeError::HijackUnsupported | UpgradeError::Hijack(_) => {
            tracing::error!(route = %target.route, error = %e, "Hijack error")
        }
        UpgradeError::Replay { .. } => {
            tracing::error!(route = %target.route, error = %e, "Error copying request to target")
        }
    }
}

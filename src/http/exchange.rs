//! Raw connection ownership handoff.
//!
//! # Responsibilities
//! - Define the `Hijack` capability the upgrade handler queries
//! - Hold a client connection while its first request head is inspected
//! - Answer simple errors on the raw stream before any handoff
//! - Hand the connection either to the upgrade handler (hijack) or to hyper
//!
//! # Design Decisions
//! - Ownership moves exactly once: `hijack` takes the stream out, and every
//!   later attempt to respond or hijack again is refused
//! - The hijacked connection carries every byte already read from the
//!   client, so nothing consumed during inspection is lost

use std::io;
use std::time::Duration;

use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::LimitsConfig;
use crate::http::head::{read_head, HeadError, RequestHead};
use crate::http::response::raw_response;
use crate::net::PrefixedStream;

/// A client connection taken out of the serving layer.
#[derive(Debug)]
pub struct HijackedConnection {
    /// The raw client stream.
    pub stream: TcpStream,
    /// Bytes already consumed from `stream`: the request head exactly as
    /// received, followed by anything the client sent after it.
    pub replay: Bytes,
}

/// Errors from [`Hijack::hijack`].
#[derive(Debug, Error)]
pub enum HijackError {
    #[error("connection has already been hijacked")]
    AlreadyHijacked,

    #[error("serving layer does not support hijacking")]
    Unsupported,
}

/// Capability to detach the underlying connection from the serving layer.
///
/// After a successful hijack the serving layer writes nothing more to the
/// connection; the caller owns every further byte.
pub trait Hijack: Send {
    fn hijack(&mut self) -> Result<HijackedConnection, HijackError>;
}

/// A client connection held by the serving layer before any handoff.
#[derive(Debug)]
pub struct RawExchange {
    stream: Option<TcpStream>,
    buf: BytesMut,
}

impl RawExchange {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
            buf: BytesMut::with_capacity(4096),
        }
    }

    /// Read the next request head, bounded by `timeout`.
    pub async fn read_head(
        &mut self,
        limits: &LimitsConfig,
        timeout: Duration,
    ) -> Result<Option<RequestHead>, HeadError> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(None);
        };
        tokio::time::timeout(timeout, read_head(stream, &mut self.buf, limits))
            .await
            .map_err(|_| HeadError::Timeout)?
    }

    /// Discard the first `len` buffered bytes (an answered request head).
    pub fn consume(&mut self, len: usize) {
        let len = len.min(self.buf.len());
        let _ = self.buf.split_to(len);
    }

    /// Write a plain-text response. Does nothing once hijacked.
    pub async fn respond(&mut self, status: StatusCode, body: &str, close: bool) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            tracing::debug!(%status, "Dropping response for hijacked connection");
            return Ok(());
        };
        stream.write_all(&raw_response(status, body, close)).await?;
        stream.flush().await
    }

    pub fn is_hijacked(&self) -> bool {
        self.stream.is_none()
    }

    /// Give the connection to another HTTP implementation, buffered bytes first.
    pub fn into_prefixed(self) -> Option<PrefixedStream<TcpStream>> {
        let stream = self.stream?;
        Some(PrefixedStream::new(self.buf.freeze(), stream))
    }
}

impl Hijack for RawExchange {
    fn hijack(&mut self) -> Result<HijackedConnection, HijackError> {
        let stream = self.stream.take().ok_or(HijackError::AlreadyHijacked)?;
        let replay = self.buf.split().freeze();
        Ok(HijackedConnection { stream, replay })
    }
}

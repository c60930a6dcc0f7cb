//! Request head reading.
//!
//! # Responsibilities
//! - Read an HTTP/1.x request head off a raw stream
//! - Enforce header size and count limits before the head is complete
//! - Build `http::request::Parts` for routing and detection
//!
//! # Design Decisions
//! - Bytes are accumulated in the caller's buffer and never modified, so
//!   the head can later be replayed exactly as received
//! - Bytes past the head (pipelined requests, early frames) stay in the buffer

use axum::http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode, Version};
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::LimitsConfig;

/// A parsed request head.
#[derive(Debug)]
pub struct RequestHead {
    /// Method, URI, version and headers.
    pub parts: Parts,
    /// Length of the head in the read buffer, including the blank line.
    pub len: usize,
}

impl RequestHead {
    /// Whether a body follows the head.
    pub fn has_body(&self) -> bool {
        if self.parts.headers.contains_key(TRANSFER_ENCODING) {
            return true;
        }
        self.parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() != "0")
            .unwrap_or(false)
    }

    /// Whether the client asked for the connection to close after this exchange.
    pub fn wants_close(&self) -> bool {
        let has_token = |token: &str| {
            self.parts
                .headers
                .get_all(CONNECTION)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(','))
                .any(|t| t.trim().eq_ignore_ascii_case(token))
        };

        match self.parts.version {
            Version::HTTP_10 => !has_token("keep-alive"),
            _ => has_token("close"),
        }
    }
}

/// Errors while reading a request head.
#[derive(Debug, Error)]
pub enum HeadError {
    #[error("I/O error reading request head: {0}")]
    Io(#[from] std::io::Error),

    #[error("request head exceeds {0} bytes")]
    TooLarge(usize),

    #[error("too many request headers")]
    TooManyHeaders,

    #[error("malformed request head: {0}")]
    Malformed(String),

    #[error("connection closed in the middle of a request head")]
    Incomplete,

    #[error("timed out waiting for request head")]
    Timeout,
}

impl HeadError {
    /// Status to answer with, if the client is still worth answering.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            HeadError::TooLarge(_) | HeadError::TooManyHeaders => {
                Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
            }
            HeadError::Malformed(_) => Some(StatusCode::BAD_REQUEST),
            HeadError::Io(_) | HeadError::Incomplete | HeadError::Timeout => None,
        }
    }
}

/// Read until `buf` holds a complete request head.
///
/// Returns `Ok(None)` if the peer closed the connection cleanly before
/// sending anything.
pub async fn read_head<R>(
    io: &mut R,
    buf: &mut BytesMut,
    limits: &LimitsConfig,
) -> Result<Option<RequestHead>, HeadError>
where
    R: AsyncRead + Unpin,
{
    loop {
        if !buf.is_empty() {
            if let Some(head) = parse_head(buf, limits)? {
                return Ok(Some(head));
            }
            if buf.len() >= limits.max_header_bytes {
                return Err(HeadError::TooLarge(limits.max_header_bytes));
            }
        }

        buf.reserve(4096);
        if io.read_buf(buf).await? == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(HeadError::Incomplete)
            };
        }
    }
}

/// Parse a complete head from the start of `buf`, or `None` if more bytes are needed.
pub fn parse_head(buf: &[u8], limits: &LimitsConfig) -> Result<Option<RequestHead>, HeadError> {
    let mut headers = vec![httparse::EMPTY_HEADER; limits.max_headers];
    let mut req = httparse::Request::new(&mut headers);

    let len = match req.parse(buf) {
        Ok(httparse::Status::Complete(len)) => len,
        Ok(httparse::Status::Partial) => return Ok(None),
        Err(httparse::Error::TooManyHeaders) => return Err(HeadError::TooManyHeaders),
        Err(e) => return Err(HeadError::Malformed(e.to_string())),
    };
    if len > limits.max_header_bytes {
        return Err(HeadError::TooLarge(limits.max_header_bytes));
    }

    let (Some(method), Some(path), Some(version)) = (req.method, req.path, req.version) else {
        return Err(HeadError::Malformed("incomplete request line".to_string()));
    };

    let mut builder = Request::builder()
        .method(method)
        .uri(path)
        .version(if version == 0 {
            Version::HTTP_10
        } else {
            Version::HTTP_11
        });
    for header in req.headers.iter() {
        builder = builder.header(header.name, header.value);
    }

    let (parts, ()) = builder
        .body(())
        .map_err(|e| HeadError::Malformed(e.to_string()))?
        .into_parts();

    Ok(Some(RequestHead { parts, len }))
}

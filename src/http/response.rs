//! Error responses.
//!
//! # Responsibilities
//! - Plain-text error bodies shared by both serving paths
//! - Serialize responses for the raw (pre-handoff) path
//! - Build axum responses for the hyper-served path
//!
//! # Design Decisions
//! - Bodies are short fixed strings; backend details go to logs only

use axum::body::Body;
use axum::http::header::{CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;

pub const NOT_FOUND: &str = "Not found.";
pub const BACKEND_UNREACHABLE: &str = "Error contacting backend server.";
pub const HIJACK_UNSUPPORTED: &str = "Connection cannot be hijacked.";
pub const BAD_GATEWAY: &str = "Upstream request failed.";

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Serialize a complete HTTP/1.1 text response.
pub fn raw_response(status: StatusCode, body: &str, close: bool) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("");
    let mut out = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nX-Content-Type-Options: nosniff\r\nContent-Length: {}\r\n",
        status.as_u16(),
        reason,
        TEXT_PLAIN,
        body.len() + 1,
    );
    if close {
        out.push_str("Connection: close\r\n");
    }
    out.push_str("\r\n");
    out.push_str(body);
    out.push('\n');
    out.into_bytes()
}

/// Build a text response for the hyper-served path.
pub fn text_response(status: StatusCode, body: &str) -> Response {
    let mut response = Response::new(Body::from(format!("{body}\n")));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_PLAIN));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_response_is_well_framed() {
        let raw = raw_response(StatusCode::NOT_FOUND, NOT_FOUND, false);
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(!text.contains("Connection: close"));
        assert!(text.ends_with("\r\n\r\nNot found.\n"));
    }

    #[test]
    fn raw_response_can_close() {
        let raw = raw_response(StatusCode::INTERNAL_SERVER_ERROR, BACKEND_UNREACHABLE, true);
        let text = String::from_utf8(raw).unwrap();
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(text.contains("Connection: close\r\n"));
    }

    #[test]
    fn text_response_headers() {
        let response = text_response(StatusCode::BAD_GATEWAY, BAD_GATEWAY);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[CONTENT_TYPE], TEXT_PLAIN);
    }
}

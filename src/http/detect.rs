//! Upgrade request detection.
//!
//! Only the first value of `Connection` and `Upgrade` is consulted. A
//! comma-joined `Connection: keep-alive, Upgrade` is therefore not treated
//! as an upgrade.

use axum::http::header::{CONNECTION, UPGRADE};
use axum::http::{HeaderMap, HeaderName};

/// Protocol token selecting the tunnel path.
pub const WEBSOCKET: &str = "websocket";

/// True iff the request asks to switch to WebSocket.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    is_upgrade_to(headers, WEBSOCKET)
}

/// True iff the first `Connection` value is `upgrade` and the first
/// `Upgrade` value is `protocol`, both compared case-insensitively.
pub fn is_upgrade_to(headers: &HeaderMap, protocol: &str) -> bool {
    first_value_is(headers, &CONNECTION, "upgrade") && first_value_is(headers, &UPGRADE, protocol)
}

fn first_value_is(headers: &HeaderMap, name: &HeaderName, expected: &str) -> bool {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case(expected))
        .unwrap_or(false)
}

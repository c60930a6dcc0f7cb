//! Upgrade-aware reverse proxy.
//!
//! Plain HTTP/1.x traffic is forwarded through a standard reverse-proxy
//! path. WebSocket upgrade requests take over the client connection, replay
//! the original request bytes to a dedicated backend over raw TCP, and
//! relay bytes in both directions until either side closes.
//!
//! # Architecture Overview
//!
//! ```text
//!                ┌──────────────────────────────────────────────────────┐
//!  client ──────▶│ net::Listener ─▶ http::server (read first head)      │
//!                │                      │                                │
//!                │          ┌───────────┴────────────┐                   │
//!                │     upgrade request          other request            │
//!                │          │                        │                   │
//!                │  http::dispatch ◀── routing ──▶ hyper + axum Router    │
//!                │          │                        │                   │
//!                │  http::upgrade                http::forward ─────────┼──▶ HTTP backend
//!                │   hijack + replay                                     │
//!                │          │                                            │
//!                │      tunnel::splice ────────────────────────────────┼──▶ upgrade backend
//!                └──────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod tunnel;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ProxyConfig;
pub use http::ProxyServer;
pub use lifecycle::Shutdown;

//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → head.rs / exchange.rs (read first request head, own the raw stream)
//!     → detect.rs (upgrade request?)
//!     → dispatch.rs (resolve target, pick path)
//!     → upgrade.rs (hijack, replay, splice)      or
//!       server.rs → forward.rs (hyper + axum, standard reverse proxy)
//!     → response.rs (error bodies for both paths)
//! ```

pub mod detect;
pub mod dispatch;
pub mod exchange;
pub mod forward;
pub mod head;
pub mod request;
pub mod response;
pub mod server;
pub mod upgrade;

pub use detect::is_upgrade_request;
pub use dispatch::{DispatchError, RequestDispatcher, RoutingDecision, UpgradeTarget};
pub use exchange::{Hijack, HijackError, HijackedConnection, RawExchange};
pub use forward::Forwarder;
pub use request::{RequestIdExt, UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, ProxyServer};
pub use upgrade::{TunnelSummary, UpgradeError, UpgradeHandler};

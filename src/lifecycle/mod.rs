//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → server stops accepting → drain tracked connections → exit
//! ```
//!
//! # Design Decisions
//! - Shutdown has a deadline: connections still open after
//!   `timeouts.drain_secs` are dropped with the runtime

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;

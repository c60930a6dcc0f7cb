//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request head (host, path, headers)
//!     → resolver.rs (TargetResolver seam)
//!     → table.rs (static table lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: TargetDescriptor or None
//! ```
//!
//! # Design Decisions
//! - Resolution is injected: the dispatcher only knows `TargetResolver`
//! - Deterministic: same input always matches same route
//! - First match wins (ordered by priority)
//! - Explicit no-match rather than silent default

pub mod matcher;
pub mod resolver;
pub mod table;

pub use resolver::{FnResolver, TargetDescriptor, TargetResolver};
pub use table::{RouteTable, StaticTableResolver};

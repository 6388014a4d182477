//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     DispatcherBuilder::register(path, handler)   (duplicates rejected)
//!     → build()
//!     → Freeze as immutable Dispatcher, shared via Arc
//!
//! Per request (any transport):
//!     Request { path, method, headers, body }
//!     → dispatcher.rs (exact path lookup)
//!     → route.rs handler call
//!     → Response, or 404 / opaque 500
//! ```
//!
//! # Design Decisions
//! - Routes registered at startup, immutable at runtime
//! - Exact path match only; at most one route per request
//! - Transports own serialization; dispatch is format-free

pub mod dispatcher;
pub mod route;

pub use dispatcher::{Dispatcher, DispatcherBuilder, RouteError};
pub use route::{Handler, HandlerError, Route};

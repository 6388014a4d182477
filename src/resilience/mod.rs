//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request from any transport:
//!     → timeouts.rs (blocking pool + deadline)
//!     → Dispatcher::dispatch
//!     → Response, or 504 on deadline, or 500 on task failure
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every dispatch has a deadline
//! - The dispatcher itself has no cancellation semantics; hosts own them

pub mod timeouts;

pub use timeouts::dispatch_with_deadline;

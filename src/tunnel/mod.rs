//! Tunnel transport subsystem.
//!
//! # Data Flow
//! ```text
//! Remote side                         Relay
//!     TunnelClient::send(Request)
//!     → frame.rs  [len u32 BE][{"id":N,"request":{..}}]
//!                                     → server.rs session reader
//!                                     → resilience::dispatch_with_deadline
//!                                     → Dispatcher::dispatch
//!                                     ← session writer
//!     ← frame.rs  [len u32 BE][{"id":N,"response":{..}}]
//!     ← waiter for id N resolved
//! ```
//!
//! # Design Decisions
//! - Many exchanges multiplexed on one session, correlated by id
//! - Bounded frame size on both read and write
//! - Sessions drain in-flight requests before closing

pub mod client;
pub mod frame;
pub mod server;

use thiserror::Error;

pub use client::TunnelClient;
pub use frame::{TunnelRequest, TunnelResponse};
pub use server::TunnelServer;

/// Errors on a tunnel session.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("tunnel I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("stream ended mid-frame")]
    Truncated,

    #[error("tunnel connection closed")]
    ConnectionClosed,
}

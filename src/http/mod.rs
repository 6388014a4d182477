//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → request.rs (convert to relay Request, body limit)
//!     → routing::Dispatcher (via resilience deadline)
//!     → response.rs (render relay Response)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{BodyError, Request, X_REQUEST_ID};
pub use response::{Response, ResponseBody};
pub use server::HttpServer;

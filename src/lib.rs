//! Tunnel relay library: an immutable route table served over framed TCP
//! tunnel sessions and plain HTTP.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod service;
pub mod tunnel;

pub use config::RelayConfig;
pub use http::{HttpServer, Request, Response};
pub use lifecycle::Shutdown;
pub use routing::{Dispatcher, DispatcherBuilder, RouteError};
pub use tunnel::{TunnelClient, TunnelServer};

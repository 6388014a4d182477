//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the enabled transports
//! - Run both servers against one dispatcher until shutdown
//!
//! # Design Decisions
//! - Fail fast: any bind error is fatal
//! - Listeners bind before serving, so callers learn real addresses first
//! - Shutdown receivers are taken eagerly; a trigger is never missed

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::config::RelayConfig;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{Listener, ListenerError};
use crate::routing::{Dispatcher, RouteError};
use crate::tunnel::TunnelServer;

/// Fatal startup or serving failure.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid route table: {0}")]
    Routes(#[from] RouteError),

    #[error("HTTP listener: {0}")]
    HttpBind(std::io::Error),

    #[error("tunnel listener: {0}")]
    TunnelBind(#[from] ListenerError),

    #[error("server error: {0}")]
    Serve(std::io::Error),
}

/// Listeners bound for the enabled transports.
pub struct BoundListeners {
    http: Option<TcpListener>,
    tunnel: Option<Listener>,
}

impl BoundListeners {
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http.as_ref().and_then(|l| l.local_addr().ok())
    }

    pub fn tunnel_addr(&self) -> Option<SocketAddr> {
        self.tunnel.as_ref().and_then(|l| l.local_addr().ok())
    }
}

/// Bind every enabled transport.
pub async fn bind(config: &RelayConfig) -> Result<BoundListeners, StartupError> {
    let http = if config.http.enabled {
        let listener = TcpListener::bind(&config.http.bind_address)
            .await
            .map_err(StartupError::HttpBind)?;
        Some(listener)
    } else {
        None
    };

    let tunnel = if config.tunnel.enabled {
        Some(Listener::bind(&config.tunnel.bind_address, config.tunnel.max_connections).await?)
    } else {
        None
    };

    Ok(BoundListeners { http, tunnel })
}

/// Serve `dispatcher` on the bound transports until `shutdown` fires.
pub async fn serve(
    config: &RelayConfig,
    listeners: BoundListeners,
    dispatcher: Arc<Dispatcher>,
    shutdown: &Shutdown,
) -> Result<(), StartupError> {
    let http = listeners.http.map(|listener| {
        let server = HttpServer::new(&config.http, &config.timeouts, dispatcher.clone());
        server.run(listener, shutdown.subscribe())
    });

    let tunnel = listeners.tunnel.map(|listener| {
        let server = TunnelServer::new(&config.tunnel, &config.timeouts, dispatcher.clone());
        server.run(listener, shutdown.subscribe())
    });

    let http = async {
        match http {
            Some(fut) => fut.await,
            None => Ok(()),
        }
    };
    let tunnel = async {
        match tunnel {
            Some(fut) => fut.await,
            None => Ok(()),
        }
    };

    tokio::try_join!(http, tunnel).map_err(StartupError::Serve)?;
    Ok(())
}

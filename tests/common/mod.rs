//! Shared utilities for integration and load testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tunnel_relay::config::RelayConfig;
use tunnel_relay::lifecycle::{self, Shutdown, StartupError};
use tunnel_relay::{Dispatcher, Response};

/// A relay running on ephemeral loopback ports.
pub struct RunningRelay {
    pub http_addr: SocketAddr,
    pub tunnel_addr: SocketAddr,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<Result<(), StartupError>>,
}

impl RunningRelay {
    /// Trigger shutdown and wait for both servers to stop.
    pub async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("relay did not stop in time")
            .expect("relay task panicked")
            .expect("relay returned an error");
    }
}

/// Loopback config with ephemeral ports.
pub fn test_config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.http.bind_address = "127.0.0.1:0".into();
    config.tunnel.bind_address = "127.0.0.1:0".into();
    config.tunnel.drain_timeout_secs = 2;
    config
}

/// Start a relay serving `dispatcher` with `config`.
pub async fn start_relay(config: RelayConfig, dispatcher: Dispatcher) -> RunningRelay {
    let listeners = lifecycle::bind(&config).await.unwrap();
    let http_addr = listeners.http_addr().unwrap();
    let tunnel_addr = listeners.tunnel_addr().unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let dispatcher = Arc::new(dispatcher);
    let handle = tokio::spawn(async move {
        lifecycle::serve(&config, listeners, dispatcher, &server_shutdown).await
    });

    RunningRelay {
        http_addr,
        tunnel_addr,
        shutdown,
        handle,
    }
}

/// The example service plus a failing and a slow route.
#[allow(dead_code)]
pub fn demo_dispatcher() -> Dispatcher {
    let mut builder = Dispatcher::builder();
    builder.register("/", tunnel_relay::service::read_root).unwrap();
    builder
        .register("/boom", || Err::<Response, _>("connection string: postgres://secret"))
        .unwrap();
    builder
        .register("/slow", || {
            std::thread::sleep(Duration::from_millis(300));
            Ok::<_, &'static str>(Response::ok([("message", "finally")]))
        })
        .unwrap();
    builder.build()
}

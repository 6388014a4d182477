//! Tunnel server: accept loop and per-session request pump.
//!
//! # Responsibilities
//! - Accept sessions within the connection limit
//! - Read request frames and dispatch each one concurrently
//! - Write responses back on the same session, tagged with the request id
//! - Drain in-flight requests on EOF, protocol error, or shutdown
//!
//! # Design Decisions
//! - One writer task per session; dispatch tasks feed it over a channel
//! - At most `max_in_flight` dispatches per session; reading pauses at the
//!   limit, so a peer that never reads responses stalls only itself
//! - Responses may leave in a different order than requests arrived
//! - A frame that cannot be decoded closes the session (no id to answer)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::sync::{broadcast, mpsc, Semaphore};

use crate::config::{TimeoutConfig, TunnelConfig};
use crate::http::{Response, X_REQUEST_ID};
use crate::net::{ConnectionGuard, ConnectionTracker, Listener};
use crate::observability::metrics;
use crate::resilience::dispatch_with_deadline;
use crate::routing::Dispatcher;
use crate::tunnel::frame::{read_frame, write_frame, TunnelRequest, TunnelResponse};
use crate::tunnel::TunnelError;

/// Responses waiting for the writer, per session.
const WRITE_QUEUE_DEPTH: usize = 64;

/// Settings each session needs.
#[derive(Debug, Clone)]
struct SessionSettings {
    max_frame_bytes: usize,
    max_in_flight: usize,
    request_timeout: Duration,
}

/// Serves a `Dispatcher` to tunnel sessions.
pub struct TunnelServer {
    dispatcher: Arc<Dispatcher>,
    settings: SessionSettings,
    drain_timeout: Duration,
    tracker: ConnectionTracker,
}

impl TunnelServer {
    pub fn new(
        config: &TunnelConfig,
        timeouts: &TimeoutConfig,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            dispatcher,
            settings: SessionSettings {
                max_frame_bytes: config.max_frame_bytes,
                max_in_flight: config.max_in_flight,
                request_timeout: Duration::from_secs(timeouts.request_secs),
            },
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
            tracker: ConnectionTracker::new(),
        }
    }

    /// Handle to the session tracker.
    pub fn tracker(&self) -> ConnectionTracker {
        self.tracker.clone()
    }

    /// Accept sessions until `shutdown` fires, then drain open sessions.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Tunnel server starting");

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Tunnel server no longer accepting sessions");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, peer, permit) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Accept failed");
                            continue;
                        }
                    };

                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(peer_addr = %peer, error = %e, "Failed to set TCP_NODELAY");
                    }

                    let guard = self.tracker.track();
                    let dispatcher = self.dispatcher.clone();
                    let settings = self.settings.clone();
                    let session_shutdown = shutdown.resubscribe();

                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();
                        serve_session(
                            reader,
                            writer,
                            peer,
                            dispatcher,
                            settings,
                            guard,
                            session_shutdown,
                        )
                        .await;
                        drop(permit);
                    });
                }
            }
        }

        let open = self.tracker.active_count();
        if open > 0 {
            tracing::info!(
                open_sessions = open,
                timeout = ?self.drain_timeout,
                "Draining tunnel sessions"
            );
            if !self.tracker.wait_for_drain(self.drain_timeout).await {
                tracing::warn!(
                    open_sessions = self.tracker.active_count(),
                    "Drain timeout elapsed with sessions still open"
                );
            }
        }

        tracing::info!("Tunnel server stopped");
        Ok(())
    }
}

/// Pump one session until EOF, error, or shutdown.
async fn serve_session<R, W>(
    reader: R,
    writer: W,
    peer: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    settings: SessionSettings,
    guard: ConnectionGuard,
    mut shutdown: broadcast::Receiver<()>,
) where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let conn_id = guard.id();
    metrics::session_opened();
    tracing::info!(connection_id = %conn_id, peer_addr = %peer, "Tunnel session opened");

    let (tx, rx) = mpsc::channel::<TunnelResponse>(WRITE_QUEUE_DEPTH);
    let writer_task = tokio::spawn(write_responses(
        writer,
        rx,
        settings.max_frame_bytes,
        conn_id.to_string(),
    ));

    let in_flight = Arc::new(Semaphore::new(settings.max_in_flight));
    let mut reader = BufReader::new(reader);
    let mut served: u64 = 0;

    loop {
        let permit = tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(connection_id = %conn_id, "Shutdown: no new requests on session");
                break;
            }
            permit = in_flight.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let frame = tokio::select! {
            _ = shutdown.recv() => {
                tracing::debug!(connection_id = %conn_id, "Shutdown: no new requests on session");
                break;
            }
            frame = read_frame::<_, TunnelRequest>(&mut reader, settings.max_frame_bytes) => frame,
        };

        let TunnelRequest { id, mut request } = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(
                    connection_id = %conn_id,
                    error = %e,
                    "Tunnel protocol error, closing session"
                );
                break;
            }
        };

        served += 1;
        let request_id = match request.request_id() {
            Some(existing) => existing.to_string(),
            None => {
                let generated = uuid::Uuid::new_v4().to_string();
                request.headers.insert(X_REQUEST_ID.to_string(), generated.clone());
                generated
            }
        };

        let dispatcher = dispatcher.clone();
        let tx = tx.clone();
        let timeout = settings.request_timeout;
        tokio::spawn(async move {
            let start = Instant::now();
            tracing::debug!(
                request_id = %request_id,
                frame_id = id,
                method = %request.method,
                path = %request.path,
                "Dispatching tunnel request"
            );

            let response = dispatch_with_deadline(dispatcher, request, timeout).await;
            metrics::record_dispatch(metrics::TRANSPORT_TUNNEL, response.status, start);

            if tx.send(TunnelResponse { id, response }).await.is_err() {
                tracing::debug!(
                    request_id = %request_id,
                    frame_id = id,
                    "Session writer gone, response dropped"
                );
            }
            drop(permit);
        });
    }

    // In-flight tasks hold sender clones; the writer finishes once they all complete.
    drop(tx);
    if let Err(e) = writer_task.await {
        tracing::error!(connection_id = %conn_id, error = %e, "Session writer task failed");
    }

    metrics::session_closed();
    tracing::info!(connection_id = %conn_id, requests = served, "Tunnel session closed");
    drop(guard);
}

async fn write_responses<W>(
    writer: W,
    mut rx: mpsc::Receiver<TunnelResponse>,
    max_frame_bytes: usize,
    conn_id: String,
) where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    while let Some(frame) = rx.recv().await {
        match write_frame(&mut writer, &frame, max_frame_bytes).await {
            Ok(()) => {}
            Err(TunnelError::FrameTooLarge { len, max }) => {
                tracing::error!(
                    connection_id = %conn_id,
                    frame_id = frame.id,
                    len,
                    max,
                    "Response exceeds frame limit"
                );
                let fallback = TunnelResponse {
                    id: frame.id,
                    response: Response::internal_error(),
                };
                if let Err(e) = write_frame(&mut writer, &fallback, max_frame_bytes).await {
                    tracing::warn!(
                        connection_id = %conn_id,
                        error = %e,
                        "Failed to write fallback response"
                    );
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %conn_id,
                    error = %e,
                    "Failed to write response, closing writer"
                );
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::Request;
    use tokio::io::{duplex, split, AsyncWriteExt};

    fn dispatcher() -> Arc<Dispatcher> {
        let mut builder = Dispatcher::builder();
        builder
            .register("/", || Ok::<_, &'static str>(Response::ok([("message", "hi")])))
            .unwrap();
        builder
            .register("/slow", || {
                std::thread::sleep(Duration::from_millis(200));
                Ok::<_, &'static str>(Response::ok([("message", "slow")]))
            })
            .unwrap();
        builder
            .register("/big", || Ok::<_, &'static str>(Response::ok([("blob", "x".repeat(1024))])))
            .unwrap();
        Arc::new(builder.build())
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            max_frame_bytes: 4096,
            max_in_flight: 16,
            request_timeout: Duration::from_secs(5),
        }
    }

    fn spawn_session<S>(
        stream: S,
        settings: SessionSettings,
        guard: ConnectionGuard,
        shutdown: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (server_r, server_w) = split(stream);
        tokio::spawn(serve_session(
            server_r,
            server_w,
            "127.0.0.1:1".parse().unwrap(),
            dispatcher(),
            settings,
            guard,
            shutdown,
        ))
    }

    #[tokio::test]
    async fn session_answers_each_request_by_id() {
        let (client, server) = duplex(64 * 1024);
        let tracker = ConnectionTracker::new();
        let (_tx, shutdown) = broadcast::channel(1);
        let session = spawn_session(server, settings(), tracker.track(), shutdown);

        let (mut client_r, mut client_w) = split(client);
        for (id, path) in [(1, "/slow"), (2, "/"), (3, "/missing")] {
            let frame = TunnelRequest { id, request: Request::new(path) };
            write_frame(&mut client_w, &frame, 4096).await.unwrap();
        }

        let mut by_id = std::collections::HashMap::new();
        for _ in 0..3 {
            let frame: TunnelResponse = read_frame(&mut client_r, 4096).await.unwrap().unwrap();
            by_id.insert(frame.id, frame.response);
        }

        assert_eq!(by_id[&1].body["message"], "slow");
        assert_eq!(by_id[&2], Response::ok([("message", "hi")]));
        assert_eq!(by_id[&3], Response::not_found());

        client_w.shutdown().await.unwrap();
        session.await.unwrap();
        assert_eq!(tracker.active_count(), 0);
    }

    #[tokio::test]
    async fn in_flight_requests_finish_after_client_half_close() {
        let (client, server) = duplex(64 * 1024);
        let (_tx, shutdown) = broadcast::channel(1);
        let session = spawn_session(server, settings(), ConnectionTracker::new().track(), shutdown);

        let (mut client_r, mut client_w) = split(client);
        let frame = TunnelRequest { id: 9, request: Request::new("/slow") };
        write_frame(&mut client_w, &frame, 4096).await.unwrap();
        client_w.shutdown().await.unwrap();

        let frame: TunnelResponse = read_frame(&mut client_r, 4096).await.unwrap().unwrap();
        assert_eq!(frame.id, 9);
        assert_eq!(frame.response.status, 200);

        session.await.unwrap();
    }

    #[tokio::test]
    async fn oversized_response_replaced_by_opaque_500() {
        let (client, server) = duplex(64 * 1024);
        let (_tx, shutdown) = broadcast::channel(1);
        let settings = SessionSettings {
            max_frame_bytes: 256,
            ..settings()
        };
        let session = spawn_session(server, settings, ConnectionTracker::new().track(), shutdown);

        let (mut client_r, mut client_w) = split(client);
        let frame = TunnelRequest { id: 7, request: Request::new("/big") };
        write_frame(&mut client_w, &frame, 256).await.unwrap();

        let reply: TunnelResponse = read_frame(&mut client_r, 256).await.unwrap().unwrap();
        assert_eq!(reply.id, 7);
        assert_eq!(reply.response, Response::internal_error());

        // The session keeps serving after the fallback.
        let frame = TunnelRequest { id: 8, request: Request::new("/") };
        write_frame(&mut client_w, &frame, 256).await.unwrap();
        let reply: TunnelResponse = read_frame(&mut client_r, 256).await.unwrap().unwrap();
        assert_eq!(reply.id, 8);
        assert_eq!(reply.response.status, 200);

        client_w.shutdown().await.unwrap();
        session.await.unwrap();
    }

    #[tokio::test]
    async fn reading_pauses_while_responses_go_unread() {
        const REQUESTS: u64 = 2000;

        let (client, server) = duplex(1024);
        let (_tx, shutdown) = broadcast::channel(1);
        let settings = SessionSettings {
            max_in_flight: 2,
            ..settings()
        };
        let session = spawn_session(server, settings, ConnectionTracker::new().track(), shutdown);

        let (mut client_r, mut client_w) = split(client);
        let sender = tokio::spawn(async move {
            for id in 0..REQUESTS {
                let frame = TunnelRequest { id, request: Request::new("/") };
                write_frame(&mut client_w, &frame, 4096).await.unwrap();
            }
            client_w
        });

        // Nobody reads responses yet, so the session must stop taking requests.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!sender.is_finished());

        let mut answered = std::collections::HashSet::new();
        let drain = tokio::time::timeout(Duration::from_secs(30), async {
            while (answered.len() as u64) < REQUESTS {
                let frame: TunnelResponse = read_frame(&mut client_r, 4096).await.unwrap().unwrap();
                assert_eq!(frame.response.status, 200);
                answered.insert(frame.id);
            }
        });
        drain.await.unwrap();

        let mut client_w = sender.await.unwrap();
        client_w.shutdown().await.unwrap();
        session.await.unwrap();
    }

    #[tokio::test]
    async fn garbage_frame_closes_session() {
        let (client, server) = duplex(4096);
        let (_tx, shutdown) = broadcast::channel(1);
        let session = spawn_session(server, settings(), ConnectionTracker::new().track(), shutdown);

        let (mut client_r, mut client_w) = split(client);
        client_w.write_all(&[0, 0, 0, 2, b'{', b'{']).await.unwrap();

        session.await.unwrap();
        let eof: Option<TunnelResponse> = read_frame(&mut client_r, 4096).await.unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn shutdown_stops_reading() {
        let (_client, server) = duplex(4096);
        let (tx, shutdown) = broadcast::channel(1);
        let session = spawn_session(server, settings(), ConnectionTracker::new().track(), shutdown);

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), session).await.unwrap().unwrap();
    }
}

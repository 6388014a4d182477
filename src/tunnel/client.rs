//! Tunnel client.
//!
//! Multiplexes requests over one session: each call gets a fresh frame id,
//! and a background reader routes responses back to the waiting caller.
//!
//! Callers never touch the socket. `send` encodes a whole frame and hands it
//! to a writer task, so dropping a `send` future part way through cannot
//! leave half a frame on the wire.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::http::{Request, Response};
use crate::tunnel::frame::{encode_frame, read_frame, TunnelRequest, TunnelResponse};
use crate::tunnel::TunnelError;

/// Encoded frames waiting for the writer.
const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Waiters keyed by frame id, plus a flag set once the reader stops.
#[derive(Default)]
struct Pending {
    waiters: DashMap<u64, oneshot::Sender<Response>>,
    closed: AtomicBool,
}

/// Removes a waiter when its `send` call finishes or is dropped.
struct WaiterGuard<'a> {
    pending: &'a Pending,
    id: u64,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.pending.waiters.remove(&self.id);
    }
}

enum Outbound {
    Frame(Vec<u8>),
    Close(oneshot::Sender<std::io::Result<()>>),
}

/// A client end of a tunnel session.
pub struct TunnelClient {
    outbound: mpsc::Sender<Outbound>,
    pending: Arc<Pending>,
    next_id: AtomicU64,
    max_frame_bytes: usize,
    reader_task: JoinHandle<()>,
}

impl TunnelClient {
    /// Open a session to `addr`.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        max_frame_bytes: usize,
    ) -> Result<Self, TunnelError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let pending = Arc::new(Pending::default());
        let reader_task = tokio::spawn(read_responses(
            BufReader::new(reader),
            pending.clone(),
            max_frame_bytes,
        ));

        let (outbound, rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);
        tokio::spawn(write_requests(writer, rx));

        Ok(Self {
            outbound,
            pending,
            next_id: AtomicU64::new(1),
            max_frame_bytes,
            reader_task,
        })
    }

    /// Send `request` and wait for its response.
    ///
    /// Cancel-safe: dropping the future abandons this call only.
    pub async fn send(&self, request: Request) -> Result<Response, TunnelError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode_frame(&TunnelRequest { id, request }, self.max_frame_bytes)?;

        let (tx, rx) = oneshot::channel();
        self.pending.waiters.insert(id, tx);
        let _guard = WaiterGuard {
            pending: &self.pending,
            id,
        };
        if self.pending.closed.load(Ordering::SeqCst) {
            return Err(TunnelError::ConnectionClosed);
        }

        self.outbound
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| TunnelError::ConnectionClosed)?;

        rx.await.map_err(|_| TunnelError::ConnectionClosed)
    }

    /// Half-close the session once queued frames are written. Responses to
    /// requests already sent still arrive.
    pub async fn close(&self) -> Result<(), TunnelError> {
        let (done, result) = oneshot::channel();
        self.outbound
            .send(Outbound::Close(done))
            .await
            .map_err(|_| TunnelError::ConnectionClosed)?;
        result.await.map_err(|_| TunnelError::ConnectionClosed)??;
        Ok(())
    }

    /// Number of requests awaiting a response.
    pub fn in_flight(&self) -> usize {
        self.pending.waiters.len()
    }
}

impl Drop for TunnelClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn write_requests<W>(mut writer: W, mut rx: mpsc::Receiver<Outbound>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Frame(frame) => {
                let written = async {
                    writer.write_all(&frame).await?;
                    writer.flush().await
                };
                if let Err(e) = written.await {
                    tracing::warn!(error = %e, "Tunnel write failed");
                    break;
                }
            }
            Outbound::Close(done) => {
                let _ = done.send(writer.shutdown().await);
                break;
            }
        }
    }
}

async fn read_responses<R>(mut reader: BufReader<R>, pending: Arc<Pending>, max_frame_bytes: usize)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame::<_, TunnelResponse>(&mut reader, max_frame_bytes).await {
            Ok(Some(TunnelResponse { id, response })) => match pending.waiters.remove(&id) {
                Some((_, waiter)) => {
                    let _ = waiter.send(response);
                }
                None => tracing::debug!(frame_id = id, "Response for abandoned or unknown id"),
            },
            Ok(None) => {
                tracing::debug!("Tunnel session closed by server");
                break;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Tunnel read failed");
                break;
            }
        }
    }
    // Dropping the senders wakes every waiter with ConnectionClosed.
    pending.closed.store(true, Ordering::SeqCst);
    pending.waiters.clear();
}

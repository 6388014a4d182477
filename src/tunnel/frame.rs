//! Length-prefixed JSON framing.
//!
//! Each frame is a 4-byte big-endian payload length followed by that many
//! bytes of JSON. A clean EOF between frames ends the stream; EOF inside a
//! frame is an error.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::{Request, Response};
use crate::tunnel::TunnelError;

/// Inbound frame: one request, tagged with a caller-chosen id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelRequest {
    pub id: u64,
    pub request: Request,
}

/// Outbound frame: the response for the request with the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelResponse {
    pub id: u64,
    pub response: Response,
}

/// Read one frame. Returns `Ok(None)` on clean EOF before a frame starts.
pub async fn read_frame<R, T>(
    reader: &mut R,
    max_frame_bytes: usize,
) -> Result<Option<T>, TunnelError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(TunnelError::Truncated);
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_frame_bytes {
        return Err(TunnelError::FrameTooLarge { len, max: max_frame_bytes });
    }

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::UnexpectedEof => TunnelError::Truncated,
        _ => TunnelError::Io(e),
    })?;

    Ok(Some(serde_json::from_slice(&payload)?))
}

/// Encode one frame, length prefix included.
///
/// Fails without producing any bytes if the payload exceeds the limit.
pub fn encode_frame<T: Serialize>(
    value: &T,
    max_frame_bytes: usize,
) -> Result<Vec<u8>, TunnelError> {
    let payload = serde_json::to_vec(value)?;
    if payload.len() > max_frame_bytes || payload.len() > u32::MAX as usize {
        return Err(TunnelError::FrameTooLarge {
            len: payload.len(),
            max: max_frame_bytes,
        });
    }

    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Write one frame and flush.
pub async fn write_frame<W, T>(
    writer: &mut W,
    value: &T,
    max_frame_bytes: usize,
) -> Result<(), TunnelError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let frame = encode_frame(value, max_frame_bytes)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

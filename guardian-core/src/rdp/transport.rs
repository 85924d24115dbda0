//! Length-prefixed message transport over any byte stream.
//!
//! ## Wire format
//!
//! ```text
//! length:    u32 big-endian  (4)
//! metadata:  JSON            (length)   at least {"size": N}
//! payload:   [u8]            (N)
//! ```
//!
//! The reader pulls the payload with bounded reads of at most
//! [`READ_CHUNK_SIZE`] bytes each and never hands back a partial message:
//! a stream that ends early yields [`GuardianError::ShortRead`].
//!
//! `ShortRead` byte counts cover the whole message read so far, so
//! `received == 0` only when the peer closed cleanly between messages.

use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::GuardianError;
use crate::message::{
    FrameMetadata, LENGTH_PREFIX_SIZE, MAX_METADATA_SIZE, READ_CHUNK_SIZE, WireMessage,
};

// ── Writing ──────────────────────────────────────────────────────

/// Write one message: length prefix, metadata block, then the payload.
///
/// Fails with [`GuardianError::MetadataMismatch`] before touching the
/// sink if `metadata.size` differs from `payload.len()`.
pub async fn write_message<W>(
    sink: &mut W,
    metadata: &FrameMetadata,
    payload: &[u8],
) -> Result<(), GuardianError>
where
    W: AsyncWrite + Unpin,
{
    if metadata.size != payload.len() {
        return Err(GuardianError::MetadataMismatch {
            declared: metadata.size,
            actual: payload.len(),
        });
    }
    metadata.check_size()?;

    let meta = metadata.to_bytes()?;
    sink.write_all(&(meta.len() as u32).to_be_bytes()).await?;
    sink.write_all(&meta).await?;
    sink.write_all(payload).await?;
    sink.flush().await?;
    Ok(())
}

// ── Reading ──────────────────────────────────────────────────────

/// Read one complete message.
pub async fn read_message<R>(source: &mut R) -> Result<WireMessage, GuardianError>
where
    R: AsyncRead + Unpin,
{
    // 1. Length prefix.
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    fill(source, &mut prefix, 0, LENGTH_PREFIX_SIZE).await?;
    let meta_len = u32::from_be_bytes(prefix) as usize;
    if meta_len > MAX_METADATA_SIZE {
        return Err(GuardianError::FrameTooLarge {
            size: meta_len,
            max: MAX_METADATA_SIZE,
        });
    }

    // 2. Metadata block.
    let header_len = LENGTH_PREFIX_SIZE + meta_len;
    let mut meta_buf = vec![0u8; meta_len];
    fill(source, &mut meta_buf, LENGTH_PREFIX_SIZE, header_len).await?;
    let metadata = FrameMetadata::from_bytes(&meta_buf)?;

    // 3. Payload, in bounded chunks.
    let total = header_len + metadata.size;
    let mut payload = Vec::with_capacity(metadata.size);
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    while payload.len() < metadata.size {
        let want = (metadata.size - payload.len()).min(READ_CHUNK_SIZE);
        let n = source.read(&mut chunk[..want]).await?;
        if n == 0 {
            return Err(GuardianError::ShortRead {
                expected: total,
                received: header_len + payload.len(),
            });
        }
        payload.extend_from_slice(&chunk[..n]);
    }

    Ok(WireMessage { metadata, payload })
}

/// Fill `buf` completely. `offset` and `total` position `buf` inside the
/// message so a short read reports whole-message counts.
async fn fill<R>(
    source: &mut R,
    buf: &mut [u8],
    offset: usize,
    total: usize,
) -> Result<(), GuardianError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(GuardianError::ShortRead {
                expected: total,
                received: offset + filled,
            });
        }
        filled += n;
    }
    Ok(())
}

// ── Deadlines ────────────────────────────────────────────────────

/// Run a socket operation under an optional deadline.
///
/// `None` blocks indefinitely.
pub async fn with_deadline<T, F>(deadline: Option<Duration>, op: F) -> Result<T, GuardianError>
where
    F: Future<Output = Result<T, GuardianError>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, op)
            .await
            .map_err(|_| GuardianError::Timeout(limit))?,
        None => op.await,
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Viewer-side receive loop.
//!
//! Reads wire messages, reverses the server's compress/encode steps via
//! [`FrameDecoder`] and hands each frame to a [`DisplaySink`]. A frame
//! reaches the sink only after its whole payload has arrived and
//! decoded.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info, warn};

use crate::error::GuardianError;
use crate::rdp::decoder::FrameDecoder;
use crate::rdp::transport::{read_message, with_deadline};
use crate::rdp::types::Frame;

// ── DisplaySink ──────────────────────────────────────────────────

/// Where decoded frames go.
pub trait DisplaySink {
    /// Present one frame.
    fn show(&mut self, frame: &Frame) -> Result<(), GuardianError>;

    /// Polled once per loop iteration; `true` ends the loop.
    fn should_stop(&mut self) -> bool {
        false
    }

    /// Release the display. Called exactly once when the loop ends.
    fn close(&mut self) {}
}

// ── StopReason / FrameStats ──────────────────────────────────────

/// Why a receive loop ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The server closed the connection between messages.
    RemoteClosed,
    /// The display sink asked to stop.
    Cancelled,
}

/// Counters for the frames a client has received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames decoded and shown.
    pub total_frames: u64,
    /// Compressed payload bytes received.
    pub total_bytes: u64,
    /// Dimensions of the last frame shown.
    pub width: u32,
    pub height: u32,
    /// Sequence number of the last frame, if the server sent one.
    pub last_seq: Option<u64>,
}

// ── ScreenClient ─────────────────────────────────────────────────

/// Receive loop for one server connection.
#[derive(Debug, Default)]
pub struct ScreenClient {
    decoder: FrameDecoder,
    io_timeout: Option<Duration>,
    stats: FrameStats,
}

impl ScreenClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_decoder(mut self, decoder: FrameDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Deadline for each message read. `None` (the default) waits forever.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Open a TCP connection to a server.
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<TcpStream, GuardianError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Receive until the server closes, the sink cancels, or an error occurs.
    ///
    /// Whatever the outcome, the sink is closed and the stream shut down
    /// before returning.
    pub async fn run<S, D>(&mut self, mut stream: S, sink: &mut D) -> Result<StopReason, GuardianError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        D: DisplaySink + ?Sized,
    {
        let outcome = self.receive_loop(&mut stream, sink).await;

        sink.close();
        if let Err(e) = stream.shutdown().await {
            debug!("socket shutdown: {e}");
        }

        info!(
            frames = self.stats.total_frames,
            bytes = self.stats.total_bytes,
            "receive loop finished"
        );

        match outcome {
            Err(GuardianError::ShortRead { received: 0, .. }) => {
                info!("server closed the stream");
                Ok(StopReason::RemoteClosed)
            }
            Err(e) => {
                warn!("stream ended: {e}");
                Err(e)
            }
            ok => ok,
        }
    }

    async fn receive_loop<S, D>(&mut self, stream: &mut S, sink: &mut D) -> Result<StopReason, GuardianError>
    where
        S: AsyncRead + Unpin,
        D: DisplaySink + ?Sized,
    {
        loop {
            if sink.should_stop() {
                return Ok(StopReason::Cancelled);
            }

            let message = with_deadline(self.io_timeout, read_message(stream)).await?;
            let frame = self.decoder.decode(&message.payload)?;

            if let (Some(w), Some(h)) = (message.metadata.width, message.metadata.height) {
                if (w, h) != frame.dimensions() {
                    debug!("metadata says {w}x{h}, decoded {:?}", frame.dimensions());
                }
            }

            self.stats.total_frames += 1;
            self.stats.total_bytes += message.payload.len() as u64;
            (self.stats.width, self.stats.height) = frame.dimensions();
            self.stats.last_seq = message.metadata.seq;

            sink.show(&frame)?;
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::FrameMetadata;
    use crate::rdp::encoder::{Compressor, ImageCodec};
    use crate::rdp::transport::write_message;
    use crate::rdp::types::PixelFormat;

    #[derive(Default)]
    struct Recorder {
        shown: Vec<(u32, u32)>,
        stop_after: Option<usize>,
        closed: u32,
    }

    impl DisplaySink for Recorder {
        fn show(&mut self, frame: &Frame) -> Result<(), GuardianError> {
            self.shown.push(frame.dimensions());
            Ok(())
        }

        fn should_stop(&mut self) -> bool {
            self.stop_after.is_some_and(|n| self.shown.len() >= n)
        }

        fn close(&mut self) {
            self.closed += 1;
        }
    }

    fn payload(w: u32, h: u32) -> Vec<u8> {
        let jpeg = ImageCodec::default()
            .encode(&Frame::filled(w, h, PixelFormat::Bgra8, [90, 90, 90]))
            .unwrap();
        Compressor::default().compress(&jpeg).unwrap()
    }

    #[tokio::test]
    async fn shows_frames_until_remote_close() {
        let (mut server, viewer) = tokio::io::duplex(1 << 20);
        for (seq, (w, h)) in [(10, 10), (64, 32)].into_iter().enumerate() {
            let data = payload(w, h);
            let meta = FrameMetadata::new(data.len()).with_seq(seq as u64);
            write_message(&mut server, &meta, &data).await.unwrap();
        }
        drop(server);

        let mut sink = Recorder::default();
        let mut client = ScreenClient::new();
        let reason = client.run(viewer, &mut sink).await.unwrap();

        assert_eq!(reason, StopReason::RemoteClosed);
        assert_eq!(sink.shown, vec![(10, 10), (64, 32)]);
        assert_eq!(sink.closed, 1);
        assert_eq!(client.stats().total_frames, 2);
        assert_eq!(client.stats().last_seq, Some(1));
        assert_eq!((client.stats().width, client.stats().height), (64, 32));
    }

    #[tokio::test]
    async fn sink_cancellation_stops_loop() {
        let (mut server, viewer) = tokio::io::duplex(1 << 20);
        for _ in 0..3 {
            let data = payload(8, 8);
            write_message(&mut server, &FrameMetadata::new(data.len()), &data)
                .await
                .unwrap();
        }

        let mut sink = Recorder {
            stop_after: Some(1),
            ..Recorder::default()
        };
        let reason = ScreenClient::new().run(viewer, &mut sink).await.unwrap();

        assert_eq!(reason, StopReason::Cancelled);
        assert_eq!(sink.shown.len(), 1);
        assert_eq!(sink.closed, 1);
    }

    #[tokio::test]
    async fn truncated_payload_never_reaches_sink() {
        let (mut server, viewer) = tokio::io::duplex(1 << 20);
        let data = payload(16, 16);
        let meta = FrameMetadata::new(data.len() + 50).to_bytes().unwrap();
        server
            .write_all(&(meta.len() as u32).to_be_bytes())
            .await
            .unwrap();
        server.write_all(&meta).await.unwrap();
        server.write_all(&data).await.unwrap();
        drop(server);

        let mut sink = Recorder::default();
        let err = ScreenClient::new().run(viewer, &mut sink).await.unwrap_err();

        assert!(matches!(err, GuardianError::ShortRead { .. }));
        assert!(sink.shown.is_empty());
        assert_eq!(sink.closed, 1);
    }

    #[tokio::test]
    async fn corrupt_payload_is_fatal() {
        let (mut server, viewer) = tokio::io::duplex(1 << 20);
        write_message(&mut server, &FrameMetadata::new(4), b"junk")
            .await
            .unwrap();

        let mut sink = Recorder::default();
        let err = ScreenClient::new().run(viewer, &mut sink).await.unwrap_err();

        assert!(matches!(err, GuardianError::Decompression(_)));
        assert!(sink.shown.is_empty());
        assert_eq!(sink.closed, 1);
    }
}

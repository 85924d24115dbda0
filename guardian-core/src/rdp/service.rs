//! Server-side streaming service.
//!
//! [`ScreenServer`] accepts viewers forever. Every accepted connection
//! gets its own [`SessionContext`] and Tokio task running:
//!
//! 1. [`FramePipeline::produce`] on the blocking pool.
//! 2. One wire message `{size, seq, width, height}` + payload.
//! 3. A fixed pacing sleep.
//!
//! A session that hits any error logs it, shuts its socket and ends.
//! Sessions share nothing, so one failing never disturbs another or the
//! accept loop.

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::codec::MessageCodec;
use crate::error::GuardianError;
use crate::message::{FrameMetadata, WireMessage};
use crate::rdp::pipeline::{EncodedPayload, FramePipeline};
use crate::rdp::transport::with_deadline;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Builds a fresh pipeline for each new session.
pub type PipelineFactory = Arc<dyn Fn() -> Result<FramePipeline, GuardianError> + Send + Sync>;

// ── SessionConfig ────────────────────────────────────────────────

/// Per-session tuning shared by every session of a server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between consecutive frames.
    pub pacing: Duration,
    /// Deadline for a single socket write. `None` blocks indefinitely.
    pub io_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pacing: Duration::from_millis(100),
            io_timeout: None,
        }
    }
}

// ── SessionEvent ─────────────────────────────────────────────────

/// Lifecycle notifications for observers of the server.
#[derive(Debug)]
pub enum SessionEvent {
    Started {
        id: u64,
        peer: SocketAddr,
    },
    Ended {
        id: u64,
        peer: SocketAddr,
        frames_sent: u64,
        /// Display form of the error that ended the session.
        reason: String,
        /// The viewer went away, as opposed to a local failure.
        remote_closed: bool,
    },
}

pub type SessionEventSender = mpsc::UnboundedSender<SessionEvent>;

// ── SessionContext ───────────────────────────────────────────────

/// Everything one session owns.
pub struct SessionContext {
    id: u64,
    peer: SocketAddr,
    /// `None` only while the pipeline is lent to the blocking pool.
    pipeline: Option<FramePipeline>,
    config: SessionConfig,
    frames_sent: u64,
}

impl SessionContext {
    pub fn new(id: u64, peer: SocketAddr, pipeline: FramePipeline, config: SessionConfig) -> Self {
        Self {
            id,
            peer,
            pipeline: Some(pipeline),
            config,
            frames_sent: 0,
        }
    }

    /// Stream frames over `stream` until something fails, then shut the
    /// stream down. Returns the error that ended the session.
    ///
    /// Viewers never send anything, so end-of-stream on the read side
    /// ends the session at once instead of on the next failed write.
    pub async fn run<S>(mut self, stream: S, events: Option<SessionEventSender>) -> GuardianError
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        notify(
            &events,
            SessionEvent::Started {
                id: self.id,
                peer: self.peer,
            },
        );

        let (reader, writer) = tokio::io::split(stream);
        let mut framed = FramedWrite::new(writer, MessageCodec::new());
        let error = tokio::select! {
            result = self.stream_frames(&mut framed) => {
                let Err(error) = result;
                error
            }
            error = watch_for_close(reader) => error,
        };

        if error.is_remote_closed() {
            info!(frames = self.frames_sent, "viewer disconnected");
        } else {
            warn!(frames = self.frames_sent, "session failed: {error}");
        }

        if let Err(e) = framed.into_inner().shutdown().await {
            debug!("socket shutdown: {e}");
        }

        let (id, peer, frames_sent) = (self.id, self.peer, self.frames_sent);
        // Release capture resources before observers hear about it.
        drop(self);
        notify(
            &events,
            SessionEvent::Ended {
                id,
                peer,
                frames_sent,
                reason: error.to_string(),
                remote_closed: error.is_remote_closed(),
            },
        );
        error
    }

    async fn stream_frames<S>(
        &mut self,
        framed: &mut FramedWrite<S, MessageCodec>,
    ) -> Result<Infallible, GuardianError>
    where
        S: AsyncWrite + Unpin + Send,
    {
        loop {
            let payload = self.produce_next().await?;
            let metadata = FrameMetadata::new(payload.data.len())
                .with_seq(self.frames_sent)
                .with_dimensions(payload.width, payload.height);
            let message = WireMessage {
                metadata,
                payload: payload.data,
            };

            with_deadline(self.config.io_timeout, framed.send(message)).await?;
            self.frames_sent += 1;

            tokio::time::sleep(self.config.pacing).await;
        }
    }

    /// Run the CPU-bound pipeline off the async workers.
    async fn produce_next(&mut self) -> Result<EncodedPayload, GuardianError> {
        let mut pipeline = self
            .pipeline
            .take()
            .ok_or_else(|| GuardianError::Other("pipeline already in use".into()))?;
        let (pipeline, result) = tokio::task::spawn_blocking(move || {
            let result = pipeline.produce();
            (pipeline, result)
        })
        .await?;
        self.pipeline = Some(pipeline);
        result
    }
}

/// Resolve once the viewer half-closes or resets the connection.
async fn watch_for_close<R>(mut reader: R) -> GuardianError
where
    R: AsyncRead + Unpin,
{
    let mut scratch = [0u8; 256];
    loop {
        match reader.read(&mut scratch).await {
            Ok(0) => return io::Error::new(io::ErrorKind::UnexpectedEof, "viewer closed").into(),
            Ok(n) => trace!("discarding {n} bytes from viewer"),
            Err(e) => return e.into(),
        }
    }
}

/// Await the next successful accept, pausing after each failure.
///
/// Errors such as EMFILE persist until descriptors free up.
async fn next_connection<T, F, Fut>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                warn!("accept error: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

fn notify(events: &Option<SessionEventSender>, event: SessionEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

// ── ScreenServer ─────────────────────────────────────────────────

/// TCP accept loop spawning one streaming session per viewer.
pub struct ScreenServer {
    listener: TcpListener,
    factory: PipelineFactory,
    config: SessionConfig,
    events: Option<SessionEventSender>,
}

impl ScreenServer {
    /// Bind the listening socket. Failure here is fatal to the caller.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        factory: PipelineFactory,
        config: SessionConfig,
    ) -> Result<Self, GuardianError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            factory,
            config,
            events: None,
        })
    }

    /// Report session lifecycle events on `tx`.
    pub fn with_events(mut self, tx: SessionEventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr, GuardianError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept viewers forever.
    pub async fn run(self) {
        let mut next_id: u64 = 0;
        match self.listener.local_addr() {
            Ok(addr) => info!("streaming server listening on {addr}"),
            Err(e) => warn!("listening on unknown address: {e}"),
        }

        loop {
            let listener = &self.listener;
            let (stream, peer) = next_connection(move || listener.accept()).await;
            next_id += 1;
            let id = next_id;
            info!(session = id, "viewer connected from {peer}");

            if let Err(e) = stream.set_nodelay(true) {
                debug!(session = id, "set_nodelay: {e}");
            }

            let pipeline = match (self.factory)() {
                Ok(p) => p,
                Err(e) => {
                    error!(session = id, "cannot build pipeline for {peer}: {e}");
                    notify(
                        &self.events,
                        SessionEvent::Ended {
                            id,
                            peer,
                            frames_sent: 0,
                            reason: e.to_string(),
                            remote_closed: false,
                        },
                    );
                    continue;
                }
            };

            let ctx = SessionContext::new(id, peer, pipeline, self.config.clone());
            let events = self.events.clone();
            let span = info_span!("session", id, %peer);
            tokio::spawn(
                async move {
                    ctx.run(stream, events).await;
                }
                .instrument(span),
            );
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::analyze::NoopAnalyzer;
    use crate::rdp::capture::PatternCapture;
    use crate::rdp::transport::read_message;
    use crate::rdp::types::Frame;

    fn peer() -> SocketAddr {
        "127.0.0.1:9".parse().unwrap()
    }

    fn fast() -> SessionConfig {
        SessionConfig {
            pacing: Duration::from_millis(1),
            io_timeout: None,
        }
    }

    #[tokio::test]
    async fn session_sends_sequenced_frames() {
        let (server_io, mut viewer_io) = tokio::io::duplex(1 << 20);
        let pipeline = FramePipeline::new(PatternCapture::checkerboard(32, 16, 4), NoopAnalyzer);
        let ctx = SessionContext::new(1, peer(), pipeline, fast());
        let session = tokio::spawn(ctx.run(server_io, None));

        for seq in 0..3 {
            let msg = read_message(&mut viewer_io).await.unwrap();
            assert_eq!(msg.metadata.seq, Some(seq));
            assert_eq!(msg.metadata.width, Some(32));
            assert_eq!(msg.metadata.height, Some(16));
            assert_eq!(msg.metadata.size, msg.payload.len());
        }

        drop(viewer_io);
        let error = session.await.unwrap();
        assert!(error.is_remote_closed(), "unexpected: {error}");
    }

    #[tokio::test]
    async fn viewer_close_ends_session_before_next_write() {
        let (server_io, mut viewer_io) = tokio::io::duplex(1 << 20);
        let pipeline = FramePipeline::new(PatternCapture::checkerboard(16, 16, 4), NoopAnalyzer);
        let slow = SessionConfig {
            pacing: Duration::from_secs(30),
            io_timeout: None,
        };
        let session = tokio::spawn(SessionContext::new(1, peer(), pipeline, slow).run(server_io, None));

        read_message(&mut viewer_io).await.unwrap();
        drop(viewer_io);

        // Well inside the pacing sleep; no write has had the chance to fail.
        let error = tokio::time::timeout(Duration::from_secs(2), session)
            .await
            .expect("session outlived its viewer")
            .unwrap();
        assert!(error.is_remote_closed(), "unexpected: {error}");
    }

    #[tokio::test]
    async fn viewer_bytes_are_ignored() {
        let (server_io, mut viewer_io) = tokio::io::duplex(1 << 20);
        let pipeline = FramePipeline::new(PatternCapture::checkerboard(16, 16, 4), NoopAnalyzer);
        let session = tokio::spawn(SessionContext::new(1, peer(), pipeline, fast()).run(server_io, None));

        viewer_io.write_all(b"keepalive?").await.unwrap();
        for seq in 0..3 {
            let msg = read_message(&mut viewer_io).await.unwrap();
            assert_eq!(msg.metadata.seq, Some(seq));
        }
        session.abort();
    }

    #[tokio::test]
    async fn accept_errors_back_off() {
        let mut failures = 2;
        let started = std::time::Instant::now();
        let conn = next_connection(|| {
            let result = if failures > 0 {
                failures -= 1;
                Err(io::Error::from_raw_os_error(24))
            } else {
                Ok(7u8)
            };
            std::future::ready(result)
        })
        .await;

        assert_eq!(conn, 7);
        assert_eq!(failures, 0);
        assert!(started.elapsed() >= ACCEPT_BACKOFF * 2);
    }

    #[tokio::test]
    async fn capture_failure_ends_session_and_reports() {
        let (server_io, mut viewer_io) = tokio::io::duplex(1 << 20);
        let mut left = 2;
        let capture = move || {
            if left == 0 {
                return Err(GuardianError::Capture("display lost".into()));
            }
            left -= 1;
            Ok(Frame::filled(8, 8, crate::rdp::types::PixelFormat::Rgb8, [1, 2, 3]))
        };
        let pipeline = FramePipeline::new(capture, NoopAnalyzer);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let ctx = SessionContext::new(7, peer(), pipeline, fast());

        let error = ctx.run(server_io, Some(tx)).await;
        assert!(matches!(error, GuardianError::Capture(_)));

        // Both frames made it out before the failure, then a clean close.
        read_message(&mut viewer_io).await.unwrap();
        read_message(&mut viewer_io).await.unwrap();
        assert!(read_message(&mut viewer_io).await.unwrap_err().is_remote_closed());

        assert!(matches!(rx.recv().await, Some(SessionEvent::Started { id: 7, .. })));
        match rx.recv().await {
            Some(SessionEvent::Ended {
                id,
                frames_sent,
                reason,
                remote_closed,
                ..
            }) => {
                assert_eq!(id, 7);
                assert_eq!(frames_sent, 2);
                assert!(reason.contains("display lost"));
                assert!(!remote_closed);
            }
            other => panic!("expected Ended, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn write_timeout_ends_stalled_session() {
        // Tiny buffer and nobody reading: the first write stalls.
        let (server_io, _viewer_io) = tokio::io::duplex(8);
        let pipeline = FramePipeline::new(PatternCapture::checkerboard(64, 64, 8), NoopAnalyzer);
        let config = SessionConfig {
            pacing: Duration::from_millis(1),
            io_timeout: Some(Duration::from_millis(50)),
        };
        let error = SessionContext::new(1, peer(), pipeline, config)
            .run(server_io, None)
            .await;
        assert!(matches!(error, GuardianError::Timeout(_)));
    }

    #[tokio::test]
    async fn factory_failure_keeps_accepting() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let factory: PipelineFactory = {
            let calls = calls.clone();
            Arc::new(move || {
                if calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Err(GuardianError::Capture("no display".into()))
                } else {
                    Ok(FramePipeline::new(
                        PatternCapture::checkerboard(16, 16, 4),
                        NoopAnalyzer,
                    ))
                }
            })
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let server = ScreenServer::bind("127.0.0.1:0", factory, fast())
            .await
            .unwrap()
            .with_events(tx);
        let addr = server.local_addr().unwrap();
        let accept = tokio::spawn(server.run());

        let mut first = tokio::net::TcpStream::connect(addr).await.unwrap();
        assert!(read_message(&mut first).await.unwrap_err().is_remote_closed());
        assert!(matches!(rx.recv().await, Some(SessionEvent::Ended { id: 1, .. })));

        let mut second = tokio::net::TcpStream::connect(addr).await.unwrap();
        let msg = read_message(&mut second).await.unwrap();
        assert_eq!(msg.metadata.width, Some(16));

        accept.abort();
    }
}

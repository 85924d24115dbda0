//! # guardian-core
//!
//! Core library for Guardian RDP: annotated screen streaming over TCP.
//!
//! This crate contains:
//! - **Wire protocol**: `FrameMetadata`, `WireMessage` and the protocol limits
//! - **Codec**: `MessageCodec` for framed TCP I/O via `tokio_util`
//! - **Pipeline**: capture, analysis, JPEG encoding and zlib or zstd compression
//! - **Server**: `ScreenServer`, one isolated session per viewer
//! - **Client**: `ScreenClient` receive loop feeding a `DisplaySink`
//! - **Error**: `GuardianError`, a typed, `thiserror`-based error hierarchy

pub mod codec;
pub mod error;
pub mod message;
pub mod rdp;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::MessageCodec;
pub use error::GuardianError;
pub use message::{
    FrameMetadata, LENGTH_PREFIX_SIZE, MAX_METADATA_SIZE, MAX_PAYLOAD_SIZE, READ_CHUNK_SIZE,
    WireMessage,
};
pub use rdp::{
    CaptureSource, CompressionKind, Compressor, DisplaySink, Frame, FrameAnalyzer, FrameDecoder,
    FramePipeline, FrameStats, ImageCodec, MarkerAnalyzer, NoopAnalyzer, PatternCapture,
    PipelineFactory, PixelFormat, ScreenCapture, ScreenClient, ScreenServer, SessionConfig,
    SessionEvent, StopReason, read_message, write_message,
};

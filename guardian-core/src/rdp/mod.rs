//! # Guardian screen streaming
//!
//! ## Architecture
//!
//! ```text
//! SERVER (per session)                        VIEWER
//! ┌─────────────────────────┐                ┌──────────────────────┐
//! │ CaptureSource           │                │ read_message         │
//! │   ↓                     │                │   ↓                  │
//! │ FrameAnalyzer           │      TCP       │ FrameDecoder         │
//! │   ↓                     │ ──────────►    │   (inflate → JPEG)   │
//! │ ImageCodec + Compressor │                │   ↓                  │
//! │   ↓                     │                │ DisplaySink          │
//! │ MessageCodec / send     │                │                      │
//! └─────────────────────────┘                └──────────────────────┘
//! ```
//!
//! ## Sub-modules
//!
//! | Module       | Purpose                                             |
//! |------------- |-----------------------------------------------------|
//! | `types`      | `Frame` pixel buffer and `PixelFormat`              |
//! | `capture`    | Capture sources (synthetic pattern, real display)   |
//! | `analyze`    | Pluggable annotation step                           |
//! | `glyphs`     | 5×7 bitmap font for frame captions                  |
//! | `encoder`    | JPEG image codec and zlib/zstd compressor           |
//! | `decoder`    | Viewer-side decompress + decode                     |
//! | `pipeline`   | Ordered capture → analyze → encode → compress       |
//! | `transport`  | Chunked length-prefixed reads and writes            |
//! | `service`    | Accept loop and per-viewer sessions                 |
//! | `client`     | Viewer receive loop                                 |

pub mod analyze;
pub mod capture;
pub mod client;
pub mod decoder;
pub mod encoder;
pub(crate) mod glyphs;
pub mod pipeline;
pub mod service;
pub mod transport;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use analyze::{FrameAnalyzer, MarkerAnalyzer, NoopAnalyzer};
pub use capture::{CaptureSource, PatternCapture, ScreenCapture};
pub use client::{DisplaySink, FrameStats, ScreenClient, StopReason};
pub use decoder::FrameDecoder;
pub use encoder::{CompressionKind, Compressor, ImageCodec};
pub use pipeline::{EncodedPayload, FramePipeline};
pub use service::{PipelineFactory, ScreenServer, SessionConfig, SessionContext, SessionEvent};
pub use transport::{read_message, write_message};
pub use types::{Frame, PixelFormat};

//! Configuration for the guardian-rdp server and viewer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use guardian_core::{
    CompressionKind, Compressor, FrameDecoder, FramePipeline, GuardianError, ImageCodec,
    MarkerAnalyzer, NoopAnalyzer, PatternCapture, PipelineFactory, ScreenCapture, SessionConfig,
};

/// Port used when an address is given without one.
pub const DEFAULT_PORT: u16 = 5000;

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardianConfig {
    /// Streaming server settings.
    pub server: ServerConfig,
    /// Viewer settings.
    pub client: ClientConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureKind {
    /// Synthetic animated checkerboard.
    Pattern,
    /// The local display (needs the `screen` feature).
    Screen,
}

/// What is drawn on frames before encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalyzerKind {
    Marker,
    None,
}

/// How the viewer presents frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DisplayKind {
    /// Live full-screen view in the terminal.
    Terminal,
    /// Headless: log frames, optionally save the latest to `snapshot_path`.
    Snapshot,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address, `host:port`.
    pub bind: String,
    /// Delay between frames of one session.
    pub pacing_ms: u64,
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    /// Payload compression; viewers must use the same kind.
    pub compression: CompressionKind,
    /// zlib 0-9, zstd 1-19.
    pub compression_level: i32,
    pub capture: CaptureKind,
    /// Pattern size when `capture = "pattern"`.
    pub pattern_width: u32,
    pub pattern_height: u32,
    pub analyzer: AnalyzerKind,
    /// Per-write deadline; 0 disables it.
    pub io_timeout_ms: u64,
}

/// Viewer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server address used when none is given on the command line.
    pub server_address: String,
    pub display: DisplayKind,
    /// Force a terminal graphics protocol: "sixel", "kitty", "iterm2"
    /// or "halfblocks". Detected when unset.
    pub graphics: Option<String>,
    /// Must match the server's `compression`.
    pub compression: CompressionKind,
    /// If set, the latest frame is saved here (format from the extension).
    pub snapshot_path: Option<PathBuf>,
    /// Stop after this many frames; 0 runs until closed.
    pub max_frames: u64,
    /// Per-read deadline; 0 disables it.
    pub io_timeout_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file. Without one, logs go to stderr, and the
    /// terminal viewer silences them.
    pub file: Option<PathBuf>,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: format!("0.0.0.0:{DEFAULT_PORT}"),
            pacing_ms: 100,
            jpeg_quality: guardian_core::rdp::encoder::DEFAULT_JPEG_QUALITY,
            compression: CompressionKind::default(),
            compression_level: guardian_core::rdp::encoder::DEFAULT_COMPRESSION_LEVEL,
            capture: CaptureKind::Pattern,
            pattern_width: 640,
            pattern_height: 360,
            analyzer: AnalyzerKind::Marker,
            io_timeout_ms: 0,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: format!("127.0.0.1:{DEFAULT_PORT}"),
            display: DisplayKind::Terminal,
            graphics: None,
            compression: CompressionKind::default(),
            snapshot_path: None,
            max_frames: 0,
            io_timeout_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl GuardianConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::debug!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl ServerConfig {
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            pacing: Duration::from_millis(self.pacing_ms),
            io_timeout: millis(self.io_timeout_ms),
        }
    }

    /// Factory building one independent pipeline per accepted session.
    pub fn pipeline_factory(&self) -> PipelineFactory {
        let cfg = self.clone();
        Arc::new(move || cfg.build_pipeline())
    }

    fn build_pipeline(&self) -> Result<FramePipeline, GuardianError> {
        let codec = ImageCodec::new(self.jpeg_quality);
        let compressor = Compressor::new(self.compression, self.compression_level);

        let pipeline = match (self.capture, self.analyzer) {
            (CaptureKind::Pattern, analyzer) => {
                let source = PatternCapture::animated(self.pattern_width, self.pattern_height, 40);
                match analyzer {
                    AnalyzerKind::Marker => FramePipeline::new(source, MarkerAnalyzer::new()),
                    AnalyzerKind::None => FramePipeline::new(source, NoopAnalyzer),
                }
            }
            (CaptureKind::Screen, analyzer) => {
                let source = ScreenCapture::new()?;
                match analyzer {
                    AnalyzerKind::Marker => FramePipeline::new(source, MarkerAnalyzer::new()),
                    AnalyzerKind::None => FramePipeline::new(source, NoopAnalyzer),
                }
            }
        };
        Ok(pipeline.with_codec(codec).with_compressor(compressor))
    }
}

impl ClientConfig {
    /// Decoder matching the server's compression.
    pub fn frame_decoder(&self) -> FrameDecoder {
        FrameDecoder::new(ImageCodec::default(), Compressor::new(self.compression, 0))
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        millis(self.io_timeout_ms)
    }

    pub fn max_frames(&self) -> Option<u64> {
        (self.max_frames > 0).then_some(self.max_frames)
    }
}

/// Append `default_port` to `addr` when it names only a host.
///
/// Bracketed IPv6 literals (`[::1]`) are handled; a bare IPv6 literal is
/// treated as a host.
pub fn resolve_server_addr(addr: &str, default_port: u16) -> String {
    let addr = addr.trim();
    if let Some(rest) = addr.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((_, tail)) if tail.starts_with(':') => addr.to_string(),
            _ => format!("{addr}:{default_port}"),
        };
    }
    match addr.matches(':').count() {
        0 => format!("{addr}:{default_port}"),
        1 => addr.to_string(),
        _ => format!("[{addr}]:{default_port}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────

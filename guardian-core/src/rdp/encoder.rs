//! Image codec and lossless compressor.
//!
//! Frames go out as JPEG (lossy, fixed quality) wrapped in a lossless
//! zlib or zstd stream. The inverse of both lives here too so server and client
//! always agree on the pair.

use std::io::{Cursor, Read, Write};

use flate2::Compression;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::{ImageBuffer, ImageFormat, RgbImage};

use serde::{Deserialize, Serialize};

use crate::error::GuardianError;
use crate::rdp::types::{Frame, PixelFormat};

/// Default JPEG quality (1..=100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Default compression level. Level 1 favours speed; JPEG output barely compresses further.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 1;

// ── ImageCodec ───────────────────────────────────────────────────

/// JPEG encoder/decoder at a fixed quality.
#[derive(Debug, Clone, Copy)]
pub struct ImageCodec {
    quality: u8,
}

impl ImageCodec {
    /// Quality is clamped to `1..=100`.
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode a frame of any pixel format to JPEG bytes.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>, GuardianError> {
        let (w, h) = frame.dimensions();
        let img: RgbImage = ImageBuffer::from_raw(w, h, frame.to_rgb8())
            .ok_or_else(|| GuardianError::Encode(format!("bad dimensions {w}x{h}")))?;

        let mut buf = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut buf, self.quality);
        img.write_with_encoder(encoder)
            .map_err(|e| GuardianError::Encode(e.to_string()))?;
        Ok(buf.into_inner())
    }

    /// Decode JPEG bytes to an RGB8 frame.
    pub fn decode(&self, data: &[u8]) -> Result<Frame, GuardianError> {
        let img = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
            .map_err(|e| GuardianError::Decode(e.to_string()))?
            .to_rgb8();
        let (w, h) = img.dimensions();
        Frame::new(w, h, PixelFormat::Rgb8, img.into_raw())
    }
}

impl Default for ImageCodec {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

// ── Compressor ───────────────────────────────────────────────────

/// Lossless wrapper format around the encoded image blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// RFC 1950 zlib stream; what stock viewers expect.
    #[default]
    Zlib,
    /// zstd frame; faster at similar ratios.
    Zstd,
}

impl CompressionKind {
    fn level_range(self) -> (i32, i32) {
        match self {
            Self::Zlib => (0, 9),
            Self::Zstd => (1, 19),
        }
    }
}

/// Compressor for the encoded image blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compressor {
    kind: CompressionKind,
    level: i32,
}

impl Compressor {
    /// Level is clamped to the format's range (zlib `0..=9`, zstd `1..=19`).
    pub fn new(kind: CompressionKind, level: i32) -> Self {
        let (lo, hi) = kind.level_range();
        Self {
            kind,
            level: level.clamp(lo, hi),
        }
    }

    pub fn zlib(level: i32) -> Self {
        Self::new(CompressionKind::Zlib, level)
    }

    pub fn zstd(level: i32) -> Self {
        Self::new(CompressionKind::Zstd, level)
    }

    pub fn kind(&self) -> CompressionKind {
        self.kind
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>, GuardianError> {
        let packed = match self.kind {
            CompressionKind::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(self.level as u32));
                encoder.write_all(data).and_then(|_| encoder.finish())
            }
            CompressionKind::Zstd => zstd::encode_all(data, self.level),
        };
        packed.map_err(|e| GuardianError::Compression(e.to_string()))
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, GuardianError> {
        let unpacked = match self.kind {
            CompressionKind::Zlib => {
                let mut out = Vec::new();
                ZlibDecoder::new(data).read_to_end(&mut out).map(|_| out)
            }
            CompressionKind::Zstd => zstd::decode_all(data),
        };
        unpacked.map_err(|e| GuardianError::Decompression(e.to_string()))
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressionKind::default(), DEFAULT_COMPRESSION_LEVEL)
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Client-side inverse of the frame pipeline.
//!
//! Takes a payload received from the network and reconstructs a
//! displayable RGB8 [`Frame`]: decompress, then JPEG decode.

use crate::error::GuardianError;
use crate::rdp::encoder::{Compressor, ImageCodec};
use crate::rdp::types::Frame;

/// Stateless decompress-then-decode step.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder {
    codec: ImageCodec,
    compressor: Compressor,
}

impl FrameDecoder {
    pub fn new(codec: ImageCodec, compressor: Compressor) -> Self {
        Self { codec, compressor }
    }

    /// Reconstruct a frame from a complete payload.
    pub fn decode(&self, payload: &[u8]) -> Result<Frame, GuardianError> {
        let image = self.compressor.decompress(payload)?;
        self.codec.decode(&image)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::types::PixelFormat;

    #[test]
    fn reverses_encode_and_compress() {
        let codec = ImageCodec::new(90);
        let compressor = Compressor::zstd(3);
        let frame = Frame::filled(48, 32, PixelFormat::Bgr8, [0, 0, 255]);
        let payload = compressor.compress(&codec.encode(&frame).unwrap()).unwrap();

        let out = FrameDecoder::new(codec, compressor).decode(&payload).unwrap();
        assert_eq!(out.dimensions(), (48, 32));
        let [r, g, b] = out.rgb_at(24, 16);
        assert!(b > 200 && r < 50 && g < 50);
    }

    #[test]
    fn decodes_zlib_wrapped_jpeg() {
        use flate2::Compression;
        use flate2::write::ZlibEncoder;
        use std::io::Write;

        let jpeg = ImageCodec::default()
            .encode(&Frame::filled(64, 64, PixelFormat::Rgb8, [20, 220, 20]))
            .unwrap();
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(&jpeg).unwrap();
        let payload = zlib.finish().unwrap();

        let out = FrameDecoder::default().decode(&payload).unwrap();
        assert_eq!(out.dimensions(), (64, 64));
        let [r, g, b] = out.rgb_at(32, 32);
        assert!(g > 180 && r < 60 && b < 60);
    }

    #[test]
    fn uncompressed_jpeg_is_rejected() {
        let jpeg = ImageCodec::default()
            .encode(&Frame::filled(8, 8, PixelFormat::Rgb8, [0, 0, 0]))
            .unwrap();
        let err = FrameDecoder::default().decode(&jpeg).unwrap_err();
        assert!(matches!(err, GuardianError::Decompression(_)));
    }
}

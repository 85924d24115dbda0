//! Per-iteration frame pipeline: capture → analyze → encode → compress.
//!
//! Each stage is a plain function call. There are no retries: the first
//! failing stage aborts the iteration and its error goes back to the
//! session loop.

use crate::error::GuardianError;
use crate::rdp::analyze::FrameAnalyzer;
use crate::rdp::capture::CaptureSource;
use crate::rdp::encoder::{Compressor, ImageCodec};
use crate::rdp::types::Frame;

// ── EncodedPayload ───────────────────────────────────────────────

/// A compressed frame ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Compressed JPEG bytes.
    pub data: Vec<u8>,
    /// Width of the frame that was encoded.
    pub width: u32,
    /// Height of the frame that was encoded.
    pub height: u32,
}

// ── produce ──────────────────────────────────────────────────────

/// Run the four stages in order.
///
/// Fails with [`GuardianError::Analysis`] if the analysis stage returns
/// a frame whose dimensions or pixel format differ from the capture.
pub fn produce<C, A, E, Z>(
    capture: C,
    analyze: A,
    encode: E,
    compress: Z,
) -> Result<EncodedPayload, GuardianError>
where
    C: FnOnce() -> Result<Frame, GuardianError>,
    A: FnOnce(Frame) -> Result<Frame, GuardianError>,
    E: FnOnce(&Frame) -> Result<Vec<u8>, GuardianError>,
    Z: FnOnce(&[u8]) -> Result<Vec<u8>, GuardianError>,
{
    let frame = capture()?;
    let shape = (frame.dimensions(), frame.format());

    let annotated = analyze(frame)?;
    if (annotated.dimensions(), annotated.format()) != shape {
        return Err(GuardianError::Analysis(format!(
            "frame changed from {:?} to {:?}",
            shape,
            (annotated.dimensions(), annotated.format())
        )));
    }

    let (width, height) = annotated.dimensions();
    let image = encode(&annotated)?;
    drop(annotated);

    let data = compress(&image)?;
    Ok(EncodedPayload {
        data,
        width,
        height,
    })
}

// ── FramePipeline ────────────────────────────────────────────────

/// The collaborators one session streams with.
///
/// Owned by exactly one session; nothing in it is shared.
pub struct FramePipeline {
    capture: Box<dyn CaptureSource>,
    analyzer: Box<dyn FrameAnalyzer>,
    codec: ImageCodec,
    compressor: Compressor,
}

impl FramePipeline {
    /// Pipeline with default JPEG quality and zlib compression.
    pub fn new<C, A>(capture: C, analyzer: A) -> Self
    where
        C: CaptureSource + 'static,
        A: FrameAnalyzer + 'static,
    {
        Self {
            capture: Box::new(capture),
            analyzer: Box::new(analyzer),
            codec: ImageCodec::default(),
            compressor: Compressor::default(),
        }
    }

    pub fn with_codec(mut self, codec: ImageCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_compressor(mut self, compressor: Compressor) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn codec(&self) -> ImageCodec {
        self.codec
    }

    pub fn compressor(&self) -> Compressor {
        self.compressor
    }

    /// Produce one encoded payload.
    pub fn produce(&mut self) -> Result<EncodedPayload, GuardianError> {
        let Self {
            capture,
            analyzer,
            codec,
            compressor,
        } = self;
        produce(
            || capture.capture(),
            |frame| analyzer.analyze(frame),
            |frame| codec.encode(frame),
            |image| compressor.compress(image),
        )
    }
}

impl std::fmt::Debug for FramePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("codec", &self.codec)
            .field("compressor", &self.compressor)
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rdp::analyze::{MarkerAnalyzer, NoopAnalyzer};
    use crate::rdp::capture::PatternCapture;
    use crate::rdp::decoder::FrameDecoder;
    use crate::rdp::types::PixelFormat;

    #[test]
    fn shape_survives_full_roundtrip() {
        for (w, h) in [(64, 64), (131, 17), (640, 360)] {
            let mut pipeline = FramePipeline::new(
                PatternCapture::checkerboard(w, h, 8),
                MarkerAnalyzer::with_seed(3),
            );
            let payload = pipeline.produce().unwrap();
            assert_eq!((payload.width, payload.height), (w, h));

            let frame = FrameDecoder::default().decode(&payload.data).unwrap();
            assert_eq!(frame.dimensions(), (w, h));
        }
    }

    #[test]
    fn stages_run_in_order() {
        let log = std::cell::RefCell::new(Vec::new());
        produce(
            || {
                log.borrow_mut().push("capture");
                Ok(Frame::filled(4, 4, PixelFormat::Rgb8, [0, 0, 0]))
            },
            |f| {
                log.borrow_mut().push("analyze");
                Ok(f)
            },
            |_| {
                log.borrow_mut().push("encode");
                Ok(vec![1, 2, 3])
            },
            |b| {
                log.borrow_mut().push("compress");
                Ok(b.to_vec())
            },
        )
        .unwrap();
        assert_eq!(*log.borrow(), ["capture", "analyze", "encode", "compress"]);
    }

    #[test]
    fn capture_failure_stops_before_encode() {
        let mut encoded = false;
        let err = produce(
            || Err(GuardianError::Capture("no screen".into())),
            Ok,
            |_| {
                encoded = true;
                Ok(Vec::new())
            },
            |b| Ok(b.to_vec()),
        )
        .unwrap_err();
        assert!(matches!(err, GuardianError::Capture(_)));
        assert!(!encoded);
    }

    #[test]
    fn analyzer_may_not_resize() {
        let shrink = |_: Frame| -> Result<Frame, GuardianError> {
            Ok(Frame::filled(2, 2, PixelFormat::Bgra8, [0, 0, 0]))
        };
        let mut pipeline = FramePipeline::new(PatternCapture::checkerboard(8, 8, 2), shrink);
        let err = pipeline.produce().unwrap_err();
        assert!(matches!(err, GuardianError::Analysis(_)));
    }

    #[test]
    fn noop_pipeline_produces_zlib() {
        let mut pipeline = FramePipeline::new(PatternCapture::checkerboard(32, 32, 4), NoopAnalyzer);
        let payload = pipeline.produce().unwrap();
        assert_eq!(payload.data[0], 0x78);
    }

    #[test]
    fn zstd_pipeline_produces_zstd() {
        let mut pipeline = FramePipeline::new(PatternCapture::checkerboard(32, 32, 4), NoopAnalyzer)
            .with_compressor(Compressor::zstd(3));
        let payload = pipeline.produce().unwrap();
        // zstd frame magic
        assert_eq!(&payload.data[..4], &[0x28, 0xB5, 0x2F, 0xFD]);
    }
}

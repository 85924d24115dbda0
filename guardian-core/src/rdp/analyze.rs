//! Pluggable frame analysis.
//!
//! An analyzer receives each captured frame before encoding and may draw
//! on it. It must hand back a frame of the same dimensions and format;
//! the pipeline rejects anything else.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::GuardianError;
use crate::rdp::glyphs::draw_text;
use crate::rdp::types::Frame;

/// Analysis capability plugged into the frame pipeline.
pub trait FrameAnalyzer: Send {
    fn analyze(&mut self, frame: Frame) -> Result<Frame, GuardianError>;
}

impl<F> FrameAnalyzer for F
where
    F: FnMut(Frame) -> Result<Frame, GuardianError> + Send,
{
    fn analyze(&mut self, frame: Frame) -> Result<Frame, GuardianError> {
        self(frame)
    }
}

// ── NoopAnalyzer ─────────────────────────────────────────────────

/// Passes frames through untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAnalyzer;

impl FrameAnalyzer for NoopAnalyzer {
    fn analyze(&mut self, frame: Frame) -> Result<Frame, GuardianError> {
        Ok(frame)
    }
}

// ── MarkerAnalyzer ───────────────────────────────────────────────

const MARKER_SIZE: u32 = 100;
const MARKER_THICKNESS: u32 = 2;
const MARKER_COLOR: [u8; 3] = [0, 255, 0];

/// Alert text drawn on every annotated frame.
pub const DEFAULT_CAPTION: &str = "GUARDIAN AI: SUSPICIOUS ACTIVITY DETECTED";

const CAPTION_X: u32 = 10;
const CAPTION_Y: u32 = 16;
const CAPTION_SCALE: u32 = 2;
const CAPTION_COLOR: [u8; 3] = [255, 0, 0];

/// Stand-in detector: outlines a random 100×100 region in green and
/// writes a red alert caption in the top-left corner.
#[derive(Debug, Clone)]
pub struct MarkerAnalyzer {
    rng: StdRng,
    caption: String,
}

impl MarkerAnalyzer {
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Deterministic marker placement.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(rng: StdRng) -> Self {
        Self {
            rng,
            caption: DEFAULT_CAPTION.to_string(),
        }
    }

    /// Replace the alert text. Letters, digits and `: . ! -` are drawn;
    /// other characters leave a blank cell.
    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    fn outline(frame: &mut Frame, x: u32, y: u32) {
        let t = MARKER_THICKNESS;
        let s = MARKER_SIZE;
        frame.fill_rect(x, y, s, t, MARKER_COLOR);
        frame.fill_rect(x, y + s - t, s, t, MARKER_COLOR);
        frame.fill_rect(x, y, t, s, MARKER_COLOR);
        frame.fill_rect(x + s - t, y, t, s, MARKER_COLOR);
    }
}

impl Default for MarkerAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAnalyzer for MarkerAnalyzer {
    fn analyze(&mut self, mut frame: Frame) -> Result<Frame, GuardianError> {
        let (w, h) = frame.dimensions();
        let x = if w > MARKER_SIZE {
            self.rng.gen_range(0..w - MARKER_SIZE)
        } else {
            0
        };
        let y = if h > MARKER_SIZE {
            self.rng.gen_range(0..h - MARKER_SIZE)
        } else {
            0
        };
        Self::outline(&mut frame, x, y);
        draw_text(
            &mut frame,
            CAPTION_X,
            CAPTION_Y,
            CAPTION_SCALE,
            &self.caption,
            CAPTION_COLOR,
        );
        Ok(frame)
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Headless display sink for the viewer.
//!
//! Logs every frame and optionally keeps the most recent one on disk as
//! an image file. Stops when the shared stop flag clears or a frame
//! limit is reached.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::RgbImage;
use tracing::{debug, info, warn};

use guardian_core::{DisplaySink, Frame, GuardianError};

pub struct SnapshotSink {
    running: Arc<AtomicBool>,
    snapshot_path: Option<PathBuf>,
    max_frames: Option<u64>,
    shown: u64,
}

impl SnapshotSink {
    pub fn new(running: Arc<AtomicBool>) -> Self {
        Self {
            running,
            snapshot_path: None,
            max_frames: None,
            shown: 0,
        }
    }

    /// Save each frame over `path`; the format follows the extension.
    pub fn with_snapshot(mut self, path: Option<PathBuf>) -> Self {
        self.snapshot_path = path;
        self
    }

    pub fn with_max_frames(mut self, max: Option<u64>) -> Self {
        self.max_frames = max;
        self
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }

    fn save(&self, frame: &Frame) -> Result<(), GuardianError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };
        let (width, height) = frame.dimensions();
        let image = RgbImage::from_raw(width, height, frame.to_rgb8())
            .ok_or_else(|| GuardianError::InvalidFrame(format!("{width}x{height} buffer")))?;
        image
            .save(path)
            .map_err(|e| GuardianError::Other(format!("snapshot {}: {e}", path.display())))
    }
}

impl DisplaySink for SnapshotSink {
    fn show(&mut self, frame: &Frame) -> Result<(), GuardianError> {
        self.shown += 1;
        let (width, height) = frame.dimensions();
        debug!(frame = self.shown, width, height, "frame");
        if self.shown == 1 {
            info!("receiving {width}x{height}");
        }
        self.save(frame)
    }

    fn should_stop(&mut self) -> bool {
        !self.running.load(Ordering::SeqCst) || self.max_frames.is_some_and(|max| self.shown >= max)
    }

    fn close(&mut self) {
        match &self.snapshot_path {
            Some(path) if self.shown > 0 => info!("last frame saved to {}", path.display()),
            Some(path) => warn!("no frame received; {} not written", path.display()),
            None => {}
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

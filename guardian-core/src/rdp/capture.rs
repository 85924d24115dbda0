//! Capture sources.
//!
//! A [`CaptureSource`] hands the pipeline one fresh [`Frame`] per call.
//!
//! - [`PatternCapture`] synthesises a checkerboard (headless runs, tests).
//! - [`ScreenCapture`] grabs the primary display through `scrap`. It is
//!   only functional with the `screen` cargo feature; without it,
//!   construction fails at runtime.

use crate::error::GuardianError;
use crate::rdp::types::{Frame, PixelFormat};

// ── CaptureSource ────────────────────────────────────────────────

/// Anything that can produce the current screen contents on demand.
pub trait CaptureSource: Send {
    fn capture(&mut self) -> Result<Frame, GuardianError>;
}

impl<F> CaptureSource for F
where
    F: FnMut() -> Result<Frame, GuardianError> + Send,
{
    fn capture(&mut self) -> Result<Frame, GuardianError> {
        self()
    }
}

// ── PatternCapture ───────────────────────────────────────────────

/// Synthetic checkerboard source.
///
/// With `animated` set, a white bar sweeps down one row per capture so
/// consecutive frames differ.
#[derive(Debug, Clone)]
pub struct PatternCapture {
    width: u32,
    height: u32,
    cell: u32,
    animated: bool,
    tick: u32,
}

impl PatternCapture {
    /// Static checkerboard with `cell`-pixel squares.
    pub fn checkerboard(width: u32, height: u32, cell: u32) -> Self {
        Self {
            width,
            height,
            cell: cell.max(1),
            animated: false,
            tick: 0,
        }
    }

    /// Checkerboard with a moving bar.
    pub fn animated(width: u32, height: u32, cell: u32) -> Self {
        Self {
            animated: true,
            ..Self::checkerboard(width, height, cell)
        }
    }
}

impl CaptureSource for PatternCapture {
    fn capture(&mut self) -> Result<Frame, GuardianError> {
        if self.width == 0 || self.height == 0 {
            return Err(GuardianError::Capture(format!(
                "empty pattern {}x{}",
                self.width, self.height
            )));
        }

        let mut frame = Frame::filled(self.width, self.height, PixelFormat::Bgra8, [0, 0, 0]);
        for y in 0..self.height {
            for x in 0..self.width {
                if ((x / self.cell) + (y / self.cell)) % 2 == 0 {
                    frame.put_rgb(x, y, [255, 255, 255]);
                }
            }
        }

        if self.animated {
            let bar = self.tick % self.height;
            frame.fill_rect(0, bar, self.width, 4, [255, 255, 0]);
            self.tick = self.tick.wrapping_add(1);
        }

        Ok(frame)
    }
}

// ── ScreenCapture ────────────────────────────────────────────────

/// Primary-display capture.
///
/// `scrap::Capturer` is not `Send` on X11, so it lives on a dedicated
/// thread; [`capture`](CaptureSource::capture) sends that thread a
/// request and blocks for the reply.
pub struct ScreenCapture {
    #[cfg(feature = "screen")]
    requests: std::sync::mpsc::Sender<std::sync::mpsc::Sender<Result<Frame, GuardianError>>>,
    width: u32,
    height: u32,
}

#[cfg(feature = "screen")]
mod platform {
    use std::io::ErrorKind;
    use std::sync::mpsc;
    use std::time::Duration;

    use scrap::{Capturer, Display};

    use super::*;

    /// How long to wait for the compositor before giving up on a frame.
    const FRAME_WAIT_ATTEMPTS: u32 = 200;

    type Reply = mpsc::Sender<Result<Frame, GuardianError>>;

    impl ScreenCapture {
        /// Open the primary display.
        pub fn new() -> Result<Self, GuardianError> {
            let (requests, inbox) = mpsc::channel::<Reply>();
            let (ready_tx, ready_rx) = mpsc::channel();

            std::thread::Builder::new()
                .name("screen-capture".into())
                .spawn(move || {
                    let opened = Display::primary().and_then(Capturer::new);
                    let mut capturer = match opened {
                        Ok(c) => {
                            let _ = ready_tx.send(Ok((c.width() as u32, c.height() as u32)));
                            c
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e.to_string()));
                            return;
                        }
                    };
                    while let Ok(reply) = inbox.recv() {
                        let _ = reply.send(grab(&mut capturer));
                    }
                })
                .map_err(|e| GuardianError::Capture(format!("spawn capture thread: {e}")))?;

            let (width, height) = ready_rx
                .recv()
                .map_err(|_| GuardianError::Capture("capture thread exited".into()))?
                .map_err(|e| GuardianError::Capture(format!("no display: {e}")))?;

            Ok(Self {
                requests,
                width,
                height,
            })
        }

        pub(super) fn request(&mut self) -> Result<Frame, GuardianError> {
            let (tx, rx) = mpsc::channel();
            self.requests
                .send(tx)
                .map_err(|_| GuardianError::Capture("capture thread gone".into()))?;
            rx.recv()
                .map_err(|_| GuardianError::Capture("capture thread gone".into()))?
        }
    }

    /// Grab one frame, repacking scrap's padded BGRA rows.
    fn grab(capturer: &mut Capturer) -> Result<Frame, GuardianError> {
        let width = capturer.width();
        let height = capturer.height();

        for _ in 0..FRAME_WAIT_ATTEMPTS {
            match capturer.frame() {
                Ok(raw) => {
                    let stride = raw.len() / height.max(1);
                    let row_len = width * 4;
                    let mut data = Vec::with_capacity(row_len * height);
                    for y in 0..height {
                        let start = y * stride;
                        data.extend_from_slice(&raw[start..start + row_len]);
                    }
                    return Frame::new(width as u32, height as u32, PixelFormat::Bgra8, data);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => return Err(GuardianError::Capture(e.to_string())),
            }
        }
        Err(GuardianError::Capture("display produced no frame".into()))
    }
}

#[cfg(not(feature = "screen"))]
impl ScreenCapture {
    /// Screen capture needs the `screen` feature.
    pub fn new() -> Result<Self, GuardianError> {
        Err(GuardianError::Capture(
            "built without the `screen` feature".into(),
        ))
    }

    fn request(&mut self) -> Result<Frame, GuardianError> {
        Err(GuardianError::Capture("not supported in this build".into()))
    }
}

impl ScreenCapture {
    /// Display width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Display height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }
}

impl CaptureSource for ScreenCapture {
    fn capture(&mut self) -> Result<Frame, GuardianError> {
        self.request()
    }
}

// ── Tests ────────────────────────────────────────────────────────

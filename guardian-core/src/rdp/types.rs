//! Shared frame types for the capture/display pipeline.
//!
//! A [`Frame`] is the raw pixel buffer passed between pipeline stages.
//! It never crosses the wire as-is; the wire carries the compressed
//! JPEG produced from it.

use crate::error::GuardianError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (typical capture output).
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 3 bytes per pixel: Red, Green, Blue (decoder output).
    Rgb8,
    /// 3 bytes per pixel: Blue, Green, Red.
    Bgr8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }

    /// Byte offsets of red, green and blue inside one pixel.
    const fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Bgr8 => (2, 1, 0),
            PixelFormat::Rgba8 | PixelFormat::Rgb8 => (0, 1, 2),
        }
    }
}

// ── Frame ────────────────────────────────────────────────────────

/// A tightly packed pixel buffer: `height` rows of `width * bpp` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a pixel buffer, checking it matches the declared geometry.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, GuardianError> {
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(GuardianError::InvalidFrame(format!(
                "{width}x{height} {format:?} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// A frame filled with a single RGB colour.
    pub fn filled(width: u32, height: u32, format: PixelFormat, rgb: [u8; 3]) -> Self {
        let bpp = format.bytes_per_pixel();
        let mut pixel = vec![0xFF; bpp];
        let (r, g, b) = format.rgb_offsets();
        pixel[r] = rgb[0];
        pixel[g] = rgb[1];
        pixel[b] = rgb[2];
        let data = pixel.repeat(width as usize * height as usize);
        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Red, green and blue of the pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let px = &self.data[self.offset(x, y)..];
        let (r, g, b) = self.format.rgb_offsets();
        [px[r], px[g], px[b]]
    }

    /// Set the pixel at `(x, y)`; out-of-bounds writes are ignored so
    /// overlays may run off the edge.
    pub fn put_rgb(&mut self, x: u32, y: u32, rgb: [u8; 3]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let offset = self.offset(x, y);
        let (r, g, b) = self.format.rgb_offsets();
        self.data[offset + r] = rgb[0];
        self.data[offset + g] = rgb[1];
        self.data[offset + b] = rgb[2];
    }

    /// Fill the clipped rectangle `[x, x + w) × [y, y + h)`.
    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, rgb: [u8; 3]) {
        let x_end = x.saturating_add(w).min(self.width);
        let y_end = y.saturating_add(h).min(self.height);
        for py in y..y_end {
            for px in x..x_end {
                self.put_rgb(px, py, rgb);
            }
        }
    }

    /// Tightly packed RGB8 copy of the pixels, as image encoders expect.
    pub fn to_rgb8(&self) -> Vec<u8> {
        if self.format == PixelFormat::Rgb8 {
            return self.data.clone();
        }
        let bpp = self.format.bytes_per_pixel();
        let (r, g, b) = self.format.rgb_offsets();
        let mut out = Vec::with_capacity(self.width as usize * self.height as usize * 3);
        for px in self.data.chunks_exact(bpp) {
            out.extend_from_slice(&[px[r], px[g], px[b]]);
        }
        out
    }

    fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.bytes_per_pixel()
    }
}

// ── Tests ────────────────────────────────────────────────────────

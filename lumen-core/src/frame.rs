//! Frame and packet types shared across the pipeline.
//!
//! [`RawFrame`] is what the capturer produces and the decoder emits;
//! [`EncodedPacket`] is one unit of codec output, carried on the wire
//! as a single length-prefixed frame.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use bytes::Bytes;

use crate::error::LumenError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout for packed raw frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 4 bytes per pixel: Blue, Green, Red, Alpha (DXGI default).
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 3 bytes per pixel: Blue, Green, Red (GDI 24bpp).
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

    /// Byte offsets of the red, green and blue channels within a pixel.
    pub const fn rgb_offsets(self) -> (usize, usize, usize) {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Bgr8 => (2, 1, 0),
            PixelFormat::Rgba8 | PixelFormat::Rgb8 => (0, 1, 2),
        }
    }
}

// ── Resolution ───────────────────────────────────────────────────

/// Frame dimensions in pixels, as announced by the stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = LumenError;

    /// Parses `"{width}x{height}"`, ignoring surrounding whitespace
    /// and trailing NUL padding.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim_matches(|c: char| c.is_whitespace() || c == '\0');
        let (w, h) = text
            .split_once('x')
            .ok_or_else(|| LumenError::InvalidHeader(format!("missing 'x' in {text:?}")))?;

        let width: u32 = w
            .parse()
            .map_err(|_| LumenError::InvalidHeader(format!("bad width {w:?}")))?;
        let height: u32 = h
            .parse()
            .map_err(|_| LumenError::InvalidHeader(format!("bad height {h:?}")))?;

        if width == 0 || height == 0 {
            return Err(LumenError::InvalidHeader(format!("zero dimension in {text:?}")));
        }
        Ok(Self { width, height })
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// One uncompressed, top-down screen sample.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may be larger than `width * bytes_per_pixel` due to
/// GPU row-alignment requirements.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row pitch in **bytes** (may exceed `width * bpp`).
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Raw pixel data, `stride * height` bytes.
    pub data: Vec<u8>,
    /// Capture sequence number on the sender, presentation index on
    /// the receiver.
    pub sequence: u64,
    /// Monotonic capture (or decode) timestamp.
    pub timestamp: Instant,
}

impl RawFrame {
    /// Allocate a zeroed, tightly packed frame.
    pub fn blank(width: u32, height: u32, format: PixelFormat) -> Self {
        let stride = width * format.bytes_per_pixel() as u32;
        Self {
            width,
            height,
            stride,
            format,
            data: vec![0u8; stride as usize * height as usize],
            sequence: 0,
            timestamp: Instant::now(),
        }
    }

    /// Total byte size the raw bitmap occupies.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Checks that `data` and `stride` can hold `width x height` pixels.
    pub fn validate(&self) -> Result<(), LumenError> {
        let min_stride = self.width as usize * self.format.bytes_per_pixel();
        if (self.stride as usize) < min_stride {
            return Err(LumenError::Other(format!(
                "stride {} shorter than row of {} bytes",
                self.stride, min_stride
            )));
        }
        if self.data.len() < self.byte_len() {
            return Err(LumenError::Other(format!(
                "frame buffer too short: {} < {}",
                self.data.len(),
                self.byte_len()
            )));
        }
        Ok(())
    }

    /// Returns a row slice (including possible padding bytes).
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride as usize;
        let end = start + self.stride as usize;
        &self.data[start..end]
    }

    /// Returns the pixel bytes at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let offset = y as usize * self.stride as usize + x as usize * bpp;
        &self.data[offset..offset + bpp]
    }

    /// The `(r, g, b)` triple at `(x, y)` regardless of layout.
    pub fn rgb(&self, x: u32, y: u32) -> (u8, u8, u8) {
        let (r, g, b) = self.format.rgb_offsets();
        let px = self.pixel(x, y);
        (px[r], px[g], px[b])
    }
}

// ── EncodedPacket ────────────────────────────────────────────────

/// One compressed payload unit emitted by an encoder session.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    /// Opaque codec bytes, never empty.
    pub data: Bytes,
    /// Presentation index of the picture this packet encodes.
    pub pts: i64,
    /// Whether the packet decodes without any earlier packet.
    pub keyframe: bool,
}

impl EncodedPacket {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────

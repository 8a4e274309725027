//! Synthetic screen source.
//!
//! Renders a diagonal gradient that scrolls one step per capture,
//! so consecutive frames differ the way a live desktop does.

use std::time::Instant;

use crate::capture::ScreenSource;
use crate::error::LumenError;
use crate::frame::{PixelFormat, RawFrame, Resolution};

/// A moving-gradient [`ScreenSource`] of any size and layout.
#[derive(Debug, Clone)]
pub struct TestPattern {
    resolution: Resolution,
    format: PixelFormat,
    /// Horizontal scroll offset, advanced on every capture.
    phase: u32,
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_format(width, height, PixelFormat::Bgra8)
    }

    pub fn with_format(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            resolution: Resolution::new(width, height),
            format,
            phase: 0,
        }
    }

    /// The colour the pattern paints at `(x, y)` for a given phase.
    pub fn colour_at(x: u32, y: u32, phase: u32) -> (u8, u8, u8) {
        let r = (x.wrapping_add(phase) & 0xFF) as u8;
        let g = (y & 0xFF) as u8;
        let b = (((x + y) / 2) & 0xFF) as u8;
        (r, g, b)
    }

    /// Render the frame for `phase` without advancing the source.
    pub fn render(&self, phase: u32) -> RawFrame {
        let Resolution { width, height } = self.resolution;
        let mut frame = RawFrame::blank(width, height, self.format);
        let bpp = self.format.bytes_per_pixel();
        let (ro, go, bo) = self.format.rgb_offsets();

        for y in 0..height {
            let row = y as usize * frame.stride as usize;
            for x in 0..width {
                let (r, g, b) = Self::colour_at(x, y, phase);
                let px = &mut frame.data[row + x as usize * bpp..][..bpp];
                px[ro] = r;
                px[go] = g;
                px[bo] = b;
                if bpp == 4 {
                    px[3] = 255;
                }
            }
        }
        frame.timestamp = Instant::now();
        frame
    }
}

impl ScreenSource for TestPattern {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn capture(&mut self) -> Result<RawFrame, LumenError> {
        if self.resolution.pixel_count() == 0 {
            return Err(LumenError::CaptureUnavailable("zero-sized display".into()));
        }
        let frame = self.render(self.phase);
        self.phase = self.phase.wrapping_add(4);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_have_requested_size() {
        let mut src = TestPattern::new(64, 48);
        let f = src.capture().unwrap();
        assert_eq!((f.width, f.height), (64, 48));
        assert_eq!(f.byte_len(), 64 * 48 * 4);
        assert!(f.validate().is_ok());
    }

    #[test]
    fn consecutive_frames_differ() {
        let mut src = TestPattern::with_format(32, 8, PixelFormat::Rgb8);
        let a = src.capture().unwrap();
        let b = src.capture().unwrap();
        assert_ne!(a.data, b.data);
        assert_eq!(b.rgb(0, 0), TestPattern::colour_at(0, 0, 4));
    }

    #[test]
    fn zero_size_is_unavailable() {
        let mut src = TestPattern::new(0, 10);
        assert!(matches!(src.capture(), Err(LumenError::CaptureUnavailable(_))));
    }
}

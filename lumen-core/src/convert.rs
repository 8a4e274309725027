//! Packed RGB ⇄ planar YUV 4:2:0 conversion.
//!
//! Full-range BT.601 coefficients in 8.8 fixed point. Chroma is
//! down-sampled by averaging each 2×2 block and up-sampled by
//! nearest neighbour, which is the cheapest resampler that keeps
//! flat regions exact.

use std::time::Instant;

use crate::frame::{PixelFormat, RawFrame, Resolution};

// ── Picture ──────────────────────────────────────────────────────

/// A planar YUV 4:2:0 picture with tightly packed planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub width: u32,
    pub height: u32,
    /// `width * height` luma samples.
    pub y: Vec<u8>,
    /// `chroma_width * chroma_height` Cb samples.
    pub u: Vec<u8>,
    /// `chroma_width * chroma_height` Cr samples.
    pub v: Vec<u8>,
}

impl Picture {
    /// Allocate a black picture.
    pub fn new(width: u32, height: u32) -> Self {
        let (cw, ch) = chroma_dims(width, height);
        Self {
            width,
            height,
            y: vec![0; width as usize * height as usize],
            u: vec![128; cw * ch],
            v: vec![128; cw * ch],
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    pub fn chroma_width(&self) -> usize {
        chroma_dims(self.width, self.height).0
    }

    /// Total sample count across all three planes.
    pub fn sample_count(&self) -> usize {
        self.y.len() + self.u.len() + self.v.len()
    }

    /// Iterates the three planes in Y, U, V order.
    pub fn planes(&self) -> [&[u8]; 3] {
        [&self.y, &self.u, &self.v]
    }

    pub fn planes_mut(&mut self) -> [&mut Vec<u8>; 3] {
        [&mut self.y, &mut self.u, &mut self.v]
    }
}

/// Chroma plane dimensions for a 4:2:0 picture (rounded up).
pub fn chroma_dims(width: u32, height: u32) -> (usize, usize) {
    (width.div_ceil(2) as usize, height.div_ceil(2) as usize)
}

// ── Packed → planar ──────────────────────────────────────────────

/// Convert a packed frame into `dst`, reusing its buffers.
///
/// `dst` is resized when its dimensions differ from `src`.
pub fn frame_to_picture(src: &RawFrame, dst: &mut Picture) {
    if dst.width != src.width || dst.height != src.height {
        *dst = Picture::new(src.width, src.height);
    }

    let w = src.width as usize;
    let h = src.height as usize;
    let bpp = src.format.bytes_per_pixel();
    let (ro, go, bo) = src.format.rgb_offsets();
    let (cw, _) = chroma_dims(src.width, src.height);

    // Luma, one row at a time.
    for y in 0..h {
        let row = &src.data[y * src.stride as usize..];
        let out = &mut dst.y[y * w..(y + 1) * w];
        for (x, luma) in out.iter_mut().enumerate() {
            let px = &row[x * bpp..];
            *luma = rgb_to_y(px[ro], px[go], px[bo]);
        }
    }

    // Chroma, averaged over each 2×2 block (clamped at odd edges).
    for cy in 0..h.div_ceil(2) {
        for cx in 0..cw {
            let (mut r, mut g, mut b, mut n) = (0u32, 0u32, 0u32, 0u32);
            for y in (cy * 2)..(cy * 2 + 2).min(h) {
                let row = &src.data[y * src.stride as usize..];
                for x in (cx * 2)..(cx * 2 + 2).min(w) {
                    let px = &row[x * bpp..];
                    r += px[ro] as u32;
                    g += px[go] as u32;
                    b += px[bo] as u32;
                    n += 1;
                }
            }
            let (r, g, b) = ((r / n) as u8, (g / n) as u8, (b / n) as u8);
            dst.u[cy * cw + cx] = rgb_to_u(r, g, b);
            dst.v[cy * cw + cx] = rgb_to_v(r, g, b);
        }
    }
}

// ── Planar → packed ──────────────────────────────────────────────

/// Convert a planar picture into a new, tightly packed frame.
pub fn picture_to_frame(src: &Picture, format: PixelFormat) -> RawFrame {
    let w = src.width as usize;
    let h = src.height as usize;
    let bpp = format.bytes_per_pixel();
    let (ro, go, bo) = format.rgb_offsets();
    let cw = src.chroma_width();
    let stride = w * bpp;
    let mut data = vec![0u8; stride * h];

    for y in 0..h {
        let out = &mut data[y * stride..(y + 1) * stride];
        for x in 0..w {
            let c = (y / 2) * cw + x / 2;
            let (r, g, b) = yuv_to_rgb(src.y[y * w + x], src.u[c], src.v[c]);
            let px = &mut out[x * bpp..(x + 1) * bpp];
            px[ro] = r;
            px[go] = g;
            px[bo] = b;
            if bpp == 4 {
                px[3] = 255;
            }
        }
    }

    RawFrame {
        width: src.width,
        height: src.height,
        stride: stride as u32,
        format,
        data,
        sequence: 0,
        timestamp: Instant::now(),
    }
}

// ── Sample math ──────────────────────────────────────────────────

#[inline]
fn rgb_to_y(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    ((77 * r + 150 * g + 29 * b + 128) >> 8).clamp(0, 255) as u8
}

#[inline]
fn rgb_to_u(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((-43 * r - 85 * g + 128 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

#[inline]
fn rgb_to_v(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((128 * r - 107 * g - 21 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

#[inline]
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> (u8, u8, u8) {
    let y = y as i32;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    let r = y + ((359 * v + 128) >> 8);
    let g = y - ((88 * u + 183 * v + 128) >> 8);
    let b = y + ((454 * u + 128) >> 8);
    (
        r.clamp(0, 255) as u8,
        g.clamp(0, 255) as u8,
        b.clamp(0, 255) as u8,
    )
}

// ── Tests ────────────────────────────────────────────────────────

//! Built-in `planar-zstd` codec.
//!
//! Pictures are quantised (low sample bits dropped according to the
//! bitrate budget) and coded either as an intra frame (the quantised
//! planes) or as an inter frame (XOR against the previous quantised
//! picture, which leaves long zero runs wherever the screen did not
//! change). Both are compressed with zstd.
//!
//! ## Packet layout
//!
//! ```text
//! kind:    u8   (1 = intra, 2 = inter)
//! shift:   u8   (quantisation step as a bit shift, 0..=3)
//! width:   u32  (LE)
//! height:  u32  (LE)
//! pts:     i64  (LE)
//! body:    [u8] (zstd; Y, U, V planes back to back)
//! ```

use std::collections::VecDeque;

use bytes::Bytes;
use tracing::trace;

use crate::codec::{EncoderSettings, PictureDecoder, PictureEncoder};
use crate::convert::Picture;
use crate::error::LumenError;
use crate::frame::{EncodedPacket, Resolution};

const KIND_INTRA: u8 = 1;
const KIND_INTER: u8 = 2;
const HEADER_LEN: usize = 18;
const MAX_DELAY: usize = 16;
const MAX_SPEED: u8 = 8;

/// Largest width or height either side of the codec accepts.
pub const MAX_DIMENSION: u32 = 8192;

/// Samples in one 4:2:0 picture of `resolution`, or an open error when
/// the size is zero or beyond [`MAX_DIMENSION`].
fn picture_samples(resolution: Resolution) -> Result<usize, LumenError> {
    let Resolution { width, height } = resolution;
    if width == 0 || height == 0 || width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(LumenError::CodecOpenFailed(format!(
            "invalid frame size {resolution}"
        )));
    }
    let luma = (width as usize).checked_mul(height as usize);
    let chroma = (width.div_ceil(2) as usize).checked_mul(height.div_ceil(2) as usize);
    luma.zip(chroma)
        .and_then(|(y, c)| c.checked_mul(2).and_then(|uv| uv.checked_add(y)))
        .ok_or_else(|| LumenError::CodecOpenFailed(format!("frame size {resolution} overflows")))
}

// ── Options ──────────────────────────────────────────────────────

/// Parsed codec options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanarOptions {
    /// 0 (smallest output) ..= 8 (fastest).
    pub speed: u8,
    /// Packets held back before the first one is released.
    pub delay: usize,
}

impl Default for PlanarOptions {
    fn default() -> Self {
        Self {
            speed: MAX_SPEED,
            delay: 0,
        }
    }
}

impl PlanarOptions {
    /// Validate `settings.params`; unknown keys are rejected.
    pub fn parse(settings: &EncoderSettings) -> Result<Self, LumenError> {
        let mut opts = Self::default();
        for (key, value) in &settings.params {
            match key.as_str() {
                "speed" => {
                    opts.speed = value
                        .parse::<u8>()
                        .ok()
                        .filter(|s| *s <= MAX_SPEED)
                        .ok_or_else(|| {
                            LumenError::CodecOpenFailed(format!("speed must be 0..=8, got {value:?}"))
                        })?;
                }
                "delay" => {
                    opts.delay = value
                        .parse::<usize>()
                        .ok()
                        .filter(|d| *d <= MAX_DELAY)
                        .ok_or_else(|| {
                            LumenError::CodecOpenFailed(format!("delay must be 0..=16, got {value:?}"))
                        })?;
                }
                other => {
                    return Err(LumenError::CodecOpenFailed(format!(
                        "unknown planar-zstd option {other:?}"
                    )));
                }
            }
        }
        Ok(opts)
    }

    /// zstd level for this speed: speed 8 → level 1, speed 0 → level 9.
    pub fn zstd_level(&self) -> i32 {
        9 - self.speed as i32
    }
}

/// Quantisation shift for a bitrate budget.
///
/// Bits per pixel per frame: `bitrate / (w * h * fps)`.
pub fn quant_shift(bitrate: u64, resolution: Resolution, fps: u32) -> u8 {
    let pixels_per_sec = resolution.pixel_count() as f64 * fps.max(1) as f64;
    let bpp = bitrate as f64 / pixels_per_sec.max(1.0);
    if bpp >= 0.5 {
        0
    } else if bpp >= 0.1 {
        1
    } else if bpp >= 0.03 {
        2
    } else {
        3
    }
}

// ── Encoder ──────────────────────────────────────────────────────

/// `planar-zstd` encoder state.
pub struct PlanarEncoder {
    resolution: Resolution,
    options: PlanarOptions,
    gop_size: u32,
    shift: u8,
    /// Quantised samples of the last coded picture.
    reference: Option<Vec<u8>>,
    since_keyframe: u32,
    pending: VecDeque<EncodedPacket>,
    end_of_stream: bool,
}

impl PlanarEncoder {
    pub fn open(resolution: Resolution, settings: &EncoderSettings) -> Result<Self, LumenError> {
        picture_samples(resolution)?;
        if settings.max_b_frames > 0 {
            return Err(LumenError::CodecOpenFailed(
                "planar-zstd has no bidirectional frames; max_b_frames must be 0".into(),
            ));
        }
        if settings.gop_size == 0 {
            return Err(LumenError::CodecOpenFailed("gop_size must be at least 1".into()));
        }
        if settings.bitrate == 0 {
            return Err(LumenError::CodecOpenFailed("bitrate must be positive".into()));
        }

        let options = PlanarOptions::parse(settings)?;
        let shift = quant_shift(settings.bitrate, resolution, settings.target_fps);

        Ok(Self {
            resolution,
            options,
            gop_size: settings.gop_size,
            shift,
            reference: None,
            since_keyframe: 0,
            pending: VecDeque::with_capacity(options.delay + 1),
            end_of_stream: false,
        })
    }

    pub fn quant_shift(&self) -> u8 {
        self.shift
    }

    fn code(&mut self, picture: &Picture, pts: i64, force_keyframe: bool) -> Result<EncodedPacket, LumenError> {
        let mut samples = Vec::with_capacity(picture.sample_count());
        for plane in picture.planes() {
            samples.extend(plane.iter().map(|s| s >> self.shift));
        }

        let intra = force_keyframe
            || self.reference.is_none()
            || self.since_keyframe + 1 >= self.gop_size;

        let body = if intra {
            samples.clone()
        } else {
            let reference = self.reference.as_deref().unwrap_or_default();
            samples.iter().zip(reference).map(|(s, r)| s ^ r).collect()
        };

        let compressed = zstd::encode_all(body.as_slice(), self.options.zstd_level())
            .map_err(|e| LumenError::EncodeFailed(format!("zstd encode failed: {e}")))?;

        let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
        out.push(if intra { KIND_INTRA } else { KIND_INTER });
        out.push(self.shift);
        out.extend_from_slice(&picture.width.to_le_bytes());
        out.extend_from_slice(&picture.height.to_le_bytes());
        out.extend_from_slice(&pts.to_le_bytes());
        out.extend_from_slice(&compressed);

        self.since_keyframe = if intra { 0 } else { self.since_keyframe + 1 };
        self.reference = Some(samples);

        Ok(EncodedPacket {
            data: Bytes::from(out),
            pts,
            keyframe: intra,
        })
    }
}

impl PictureEncoder for PlanarEncoder {
    fn send_picture(
        &mut self,
        picture: Option<&Picture>,
        pts: i64,
        force_keyframe: bool,
    ) -> Result<(), LumenError> {
        if self.end_of_stream {
            return Err(LumenError::EncodeFailed("encoder already flushed".into()));
        }
        let Some(picture) = picture else {
            self.end_of_stream = true;
            return Ok(());
        };
        if picture.resolution() != self.resolution {
            return Err(LumenError::EncodeFailed(format!(
                "picture is {}, encoder opened for {}",
                picture.resolution(),
                self.resolution
            )));
        }

        let packet = self.code(picture, pts, force_keyframe)?;
        trace!(pts, keyframe = packet.keyframe, bytes = packet.len(), "coded picture");
        self.pending.push_back(packet);
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<Option<EncodedPacket>, LumenError> {
        if self.end_of_stream || self.pending.len() > self.options.delay {
            Ok(self.pending.pop_front())
        } else {
            Ok(None)
        }
    }
}

// ── Decoder ──────────────────────────────────────────────────────

/// `planar-zstd` decoder state, bound to one picture size.
pub struct PlanarDecoder {
    resolution: Resolution,
    samples: usize,
    /// Quantised samples and shift of the last decoded picture.
    reference: Option<(Vec<u8>, u8)>,
    ready: Option<(Picture, i64)>,
}

impl PlanarDecoder {
    pub fn new(resolution: Resolution) -> Result<Self, LumenError> {
        Ok(Self {
            resolution,
            samples: picture_samples(resolution)?,
            reference: None,
            ready: None,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

impl PictureDecoder for PlanarDecoder {
    fn send_packet(&mut self, data: &[u8]) -> Result<(), LumenError> {
        if data.len() < HEADER_LEN {
            return Err(LumenError::DecodeFailed(format!(
                "packet too short: {} < {HEADER_LEN}",
                data.len()
            )));
        }

        let kind = data[0];
        let shift = data[1];
        let width = u32::from_le_bytes([data[2], data[3], data[4], data[5]]);
        let height = u32::from_le_bytes([data[6], data[7], data[8], data[9]]);
        let mut pts_bytes = [0u8; 8];
        pts_bytes.copy_from_slice(&data[10..18]);
        let pts = i64::from_le_bytes(pts_bytes);

        if kind != KIND_INTRA && kind != KIND_INTER {
            return Err(LumenError::DecodeFailed(format!("unknown frame kind {kind}")));
        }
        if shift > 7 {
            return Err(LumenError::DecodeFailed("corrupt packet header".into()));
        }
        let resolution = Resolution::new(width, height);
        if resolution != self.resolution {
            return Err(LumenError::DecodeFailed(format!(
                "packet is {resolution}, stream is {}",
                self.resolution
            )));
        }

        let body = zstd::bulk::decompress(&data[HEADER_LEN..], self.samples)
            .map_err(|e| LumenError::DecodeFailed(format!("zstd decode failed: {e}")))?;
        if body.len() != self.samples {
            return Err(LumenError::DecodeFailed(format!(
                "body holds {} samples, {resolution} needs {}",
                body.len(),
                self.samples
            )));
        }

        let samples = if kind == KIND_INTRA {
            body
        } else {
            match &self.reference {
                Some((reference, ref_shift)) if *ref_shift == shift => {
                    body.iter().zip(reference).map(|(d, r)| d ^ r).collect()
                }
                Some(_) => {
                    return Err(LumenError::DecodeFailed(
                        "inter frame does not match reference picture".into(),
                    ));
                }
                None => {
                    return Err(LumenError::DecodeFailed("inter frame without reference".into()));
                }
            }
        };

        // Reconstruct at the middle of each quantisation step.
        let mut picture = Picture::new(width, height);
        let half = if shift > 0 { 1u16 << (shift - 1) } else { 0 };
        let mut offset = 0;
        for plane in picture.planes_mut() {
            let n = plane.len();
            for (dst, q) in plane.iter_mut().zip(&samples[offset..offset + n]) {
                *dst = (((*q as u16) << shift) + half).min(255) as u8;
            }
            offset += n;
        }

        self.reference = Some((samples, shift));
        self.ready = Some((picture, pts));
        Ok(())
    }

    fn receive_picture(&mut self) -> Result<Option<(Picture, i64)>, LumenError> {
        Ok(self.ready.take())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> EncoderSettings {
        EncoderSettings {
            bitrate: 100_000_000,
            ..EncoderSettings::default()
        }
    }

    fn picture(w: u32, h: u32, luma: u8) -> Picture {
        let mut p = Picture::new(w, h);
        p.y.fill(luma);
        p
    }

    fn encode_one(enc: &mut PlanarEncoder, p: &Picture, pts: i64) -> EncodedPacket {
        enc.send_picture(Some(p), pts, false).unwrap();
        enc.receive_packet().unwrap().expect("packet")
    }

    #[test]
    fn first_packet_is_intra_then_inter() {
        let mut enc = PlanarEncoder::open(Resolution::new(16, 16), &settings()).unwrap();
        let a = encode_one(&mut enc, &picture(16, 16, 10), 0);
        let b = encode_one(&mut enc, &picture(16, 16, 10), 1);
        assert!(a.keyframe);
        assert!(!b.keyframe);
        // Identical pictures leave an all-zero residual.
        assert!(b.len() <= a.len());
    }

    #[test]
    fn keyframe_every_gop() {
        let s = EncoderSettings {
            gop_size: 3,
            ..settings()
        };
        let mut enc = PlanarEncoder::open(Resolution::new(8, 8), &s).unwrap();
        let keys: Vec<bool> = (0..7)
            .map(|i| encode_one(&mut enc, &picture(8, 8, i as u8), i).keyframe)
            .collect();
        assert_eq!(keys, vec![true, false, false, true, false, false, true]);
    }

    #[test]
    fn forced_keyframe() {
        let mut enc = PlanarEncoder::open(Resolution::new(8, 8), &settings()).unwrap();
        encode_one(&mut enc, &picture(8, 8, 1), 0);
        enc.send_picture(Some(&picture(8, 8, 2)), 1, true).unwrap();
        assert!(enc.receive_packet().unwrap().unwrap().keyframe);
    }

    #[test]
    fn delay_buffers_until_flush() {
        let mut s = settings();
        s.params.insert("delay".into(), "2".into());
        let mut enc = PlanarEncoder::open(Resolution::new(8, 8), &s).unwrap();

        enc.send_picture(Some(&picture(8, 8, 1)), 0, false).unwrap();
        assert!(enc.receive_packet().unwrap().is_none());
        enc.send_picture(Some(&picture(8, 8, 2)), 1, false).unwrap();
        assert!(enc.receive_packet().unwrap().is_none());
        enc.send_picture(Some(&picture(8, 8, 3)), 2, false).unwrap();
        assert_eq!(enc.receive_packet().unwrap().unwrap().pts, 0);
        assert!(enc.receive_packet().unwrap().is_none());

        enc.send_picture(None, 0, false).unwrap();
        assert_eq!(enc.receive_packet().unwrap().unwrap().pts, 1);
        assert_eq!(enc.receive_packet().unwrap().unwrap().pts, 2);
        assert!(enc.receive_packet().unwrap().is_none());
        assert!(enc.send_picture(Some(&picture(8, 8, 4)), 3, false).is_err());
    }

    #[test]
    fn rejects_bad_options() {
        let mut s = settings();
        s.params.insert("speed".into(), "11".into());
        assert!(matches!(
            PlanarEncoder::open(Resolution::new(8, 8), &s),
            Err(LumenError::CodecOpenFailed(_))
        ));

        let mut s = settings();
        s.params.insert("tile-columns".into(), "2".into());
        assert!(PlanarEncoder::open(Resolution::new(8, 8), &s).is_err());

        let s = EncoderSettings {
            max_b_frames: 2,
            ..settings()
        };
        assert!(PlanarEncoder::open(Resolution::new(8, 8), &s).is_err());
        assert!(PlanarEncoder::open(Resolution::new(0, 8), &settings()).is_err());
    }

    #[test]
    fn quant_shift_follows_budget() {
        let r = Resolution::new(1920, 1080);
        assert_eq!(quant_shift(100_000_000, r, 30), 0);
        assert_eq!(quant_shift(10_000_000, r, 30), 1);
        assert_eq!(quant_shift(3_000_000, r, 30), 2);
        assert_eq!(quant_shift(500_000, r, 30), 3);
    }

    #[test]
    fn lossless_round_trip_at_high_bitrate() {
        let mut enc = PlanarEncoder::open(Resolution::new(6, 4), &settings()).unwrap();
        assert_eq!(enc.quant_shift(), 0);
        let mut dec = PlanarDecoder::new(Resolution::new(6, 4)).unwrap();

        let mut p = Picture::new(6, 4);
        for (i, s) in p.y.iter_mut().enumerate() {
            *s = (i * 7) as u8;
        }
        for pts in 0..3 {
            let pkt = encode_one(&mut enc, &p, pts);
            dec.send_packet(&pkt.data).unwrap();
            let (out, out_pts) = dec.receive_picture().unwrap().unwrap();
            assert_eq!(out, p);
            assert_eq!(out_pts, pts);
            assert!(dec.receive_picture().unwrap().is_none());
            p.y[0] = p.y[0].wrapping_add(1);
        }
    }

    #[test]
    fn inter_without_reference_fails() {
        let mut enc = PlanarEncoder::open(Resolution::new(8, 8), &settings()).unwrap();
        encode_one(&mut enc, &picture(8, 8, 1), 0);
        let inter = encode_one(&mut enc, &picture(8, 8, 2), 1);

        let mut dec = PlanarDecoder::new(Resolution::new(8, 8)).unwrap();
        assert!(matches!(
            dec.send_packet(&inter.data),
            Err(LumenError::DecodeFailed(_))
        ));
        assert!(dec.receive_picture().unwrap().is_none());
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let mut dec = PlanarDecoder::new(Resolution::new(8, 8)).unwrap();
        assert!(dec.send_packet(&[1, 2, 3]).is_err());
        let mut junk = vec![KIND_INTRA, 0, 8, 0, 0, 0, 8, 0, 0, 0];
        junk.extend_from_slice(&0i64.to_le_bytes());
        junk.extend_from_slice(b"not zstd at all");
        assert!(dec.send_packet(&junk).is_err());
    }

    fn intra_header(width: u32, height: u32) -> Vec<u8> {
        let mut data = vec![KIND_INTRA, 0];
        data.extend_from_slice(&width.to_le_bytes());
        data.extend_from_slice(&height.to_le_bytes());
        data.extend_from_slice(&0i64.to_le_bytes());
        data
    }

    #[test]
    fn foreign_dimensions_are_rejected_before_decoding() {
        let mut enc = PlanarEncoder::open(Resolution::new(8, 8), &settings()).unwrap();
        let mut dec = PlanarDecoder::new(Resolution::new(8, 8)).unwrap();

        let mut huge = intra_header(u32::MAX, u32::MAX);
        huge.extend_from_slice(&zstd::encode_all(&[][..], 0).unwrap());
        assert!(matches!(dec.send_packet(&huge), Err(LumenError::DecodeFailed(_))));

        let mut other = intra_header(4, 4);
        other.extend_from_slice(&zstd::encode_all(&[0u8; 24][..], 0).unwrap());
        assert!(matches!(dec.send_packet(&other), Err(LumenError::DecodeFailed(_))));
        assert!(dec.receive_picture().unwrap().is_none());

        let good = encode_one(&mut enc, &picture(8, 8, 40), 3);
        dec.send_packet(&good.data).unwrap();
        let (out, pts) = dec.receive_picture().unwrap().unwrap();
        assert_eq!((out.width, out.height, pts), (8, 8, 3));
    }

    #[test]
    fn oversized_body_is_a_decode_error() {
        let mut dec = PlanarDecoder::new(Resolution::new(8, 8)).unwrap();
        let mut packet = intra_header(8, 8);
        packet.extend_from_slice(&zstd::encode_all(&vec![7u8; 1 << 20][..], 0).unwrap());
        assert!(matches!(dec.send_packet(&packet), Err(LumenError::DecodeFailed(_))));
    }

    #[test]
    fn sizes_beyond_limit_do_not_open() {
        assert!(PlanarDecoder::new(Resolution::new(MAX_DIMENSION + 1, 16)).is_err());
        assert!(PlanarDecoder::new(Resolution::new(0, 16)).is_err());
        assert!(PlanarEncoder::open(Resolution::new(16, u32::MAX), &settings()).is_err());
        assert_eq!(picture_samples(Resolution::new(5, 3)).unwrap(), 15 + 2 * 3 * 2);
    }
}

//! Decoder session: mirror of [`EncoderSession`](super::EncoderSession).

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tracing::debug;

use crate::codec::{CodecKind, PictureDecoder, open_decoder};
use crate::convert::picture_to_frame;
use crate::error::LumenError;
use crate::frame::{PixelFormat, RawFrame, Resolution};

/// Exclusive handle to one decoder context.
#[derive(Clone)]
pub struct DecoderSession {
    inner: Arc<Mutex<Option<Box<dyn PictureDecoder>>>>,
    kind: CodecKind,
    resolution: Resolution,
    output_format: PixelFormat,
}

impl DecoderSession {
    /// Open a decode context for a stream of `resolution`; output
    /// frames are BGRA. Packets of any other size are rejected.
    pub fn open(kind: CodecKind, resolution: Resolution) -> Result<Self, LumenError> {
        let backend = open_decoder(kind, resolution)?;
        debug!(codec = %kind, %resolution, "decoder opened");
        Ok(Self {
            inner: Arc::new(Mutex::new(Some(backend))),
            kind,
            resolution,
            output_format: PixelFormat::Bgra8,
        })
    }

    /// Packed layout decoded pictures are converted into.
    pub fn with_output_format(mut self, format: PixelFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Submit one packet and drain every picture it completes.
    ///
    /// An empty result means the codec wants more input. Each frame's
    /// `sequence` carries the presentation index coded in the packet.
    pub fn decode(&self, packet: &[u8]) -> Result<Vec<RawFrame>, LumenError> {
        if packet.is_empty() {
            return Err(LumenError::DecodeFailed("empty packet".into()));
        }

        let mut guard = self.lock();
        let backend = guard
            .as_mut()
            .ok_or_else(|| LumenError::DecodeFailed("decoder is closed".into()))?;

        backend.send_packet(packet)?;

        let mut frames = Vec::new();
        while let Some((picture, pts)) = backend.receive_picture()? {
            let mut frame = picture_to_frame(&picture, self.output_format);
            frame.sequence = pts.max(0) as u64;
            frame.timestamp = Instant::now();
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Release the context. Returns `false` if it was already closed.
    pub fn close(&self) -> bool {
        let closed = self.lock().take().is_some();
        if closed {
            debug!(codec = %self.kind, "decoder closed");
        }
        closed
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn PictureDecoder>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for DecoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderSession")
            .field("kind", &self.kind)
            .field("resolution", &self.resolution)
            .field("output_format", &self.output_format)
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ScreenSource, TestPattern};
    use crate::codec::{EncoderSession, EncoderSettings};

    #[test]
    fn round_trip_keeps_dimensions() {
        let (w, h) = (96, 54);
        let enc = EncoderSession::open(w, h, &EncoderSettings::default()).unwrap();
        let dec = DecoderSession::open(CodecKind::PlanarZstd, Resolution::new(w, h)).unwrap();
        let mut src = TestPattern::new(w, h);

        for pts in 0..4 {
            let frame = src.capture().unwrap();
            for packet in enc.encode(&frame, pts).unwrap() {
                let out = dec.decode(&packet.data).unwrap();
                assert_eq!(out.len(), 1);
                assert_eq!((out[0].width, out[0].height), (w, h));
                assert_eq!(out[0].sequence, pts as u64);
                assert_eq!(out[0].format, PixelFormat::Bgra8);
            }
        }
    }

    #[test]
    fn lossy_content_stays_close() {
        let (w, h) = (32, 32);
        let settings = EncoderSettings {
            bitrate: 1_000_000_000,
            ..EncoderSettings::default()
        };
        let enc = EncoderSession::open(w, h, &settings).unwrap();
        let dec = DecoderSession::open(CodecKind::PlanarZstd, Resolution::new(w, h))
            .unwrap()
            .with_output_format(PixelFormat::Rgb8);

        let mut frame = RawFrame::blank(w, h, PixelFormat::Rgb8);
        frame.data.fill(90);
        let packet = enc.encode(&frame, 0).unwrap().remove(0);
        let out = dec.decode(&packet.data).unwrap().remove(0);

        let (r, g, b) = out.rgb(5, 5);
        for c in [r, g, b] {
            assert!(c.abs_diff(90) <= 2, "channel {c} too far from 90");
        }
    }

    #[test]
    fn bad_packet_is_skipped_not_fatal() {
        let enc = EncoderSession::open(16, 16, &EncoderSettings::default()).unwrap();
        let dec = DecoderSession::open(CodecKind::PlanarZstd, Resolution::new(16, 16)).unwrap();
        let mut src = TestPattern::new(16, 16);

        assert!(matches!(dec.decode(&[]), Err(LumenError::DecodeFailed(_))));
        assert!(dec.decode(b"garbage bytes that are not a packet").is_err());

        let packet = enc.encode(&src.capture().unwrap(), 0).unwrap().remove(0);
        assert_eq!(dec.decode(&packet.data).unwrap().len(), 1);
    }

    #[test]
    fn close_exactly_once() {
        let dec = DecoderSession::open(CodecKind::PlanarZstd, Resolution::new(16, 16)).unwrap();
        assert!(dec.close());
        assert!(!dec.close());
        assert!(dec.decode(&[1]).is_err());
    }

    #[test]
    fn packets_of_another_size_are_skipped() {
        let small = EncoderSession::open(8, 8, &EncoderSettings::default()).unwrap();
        let dec = DecoderSession::open(CodecKind::PlanarZstd, Resolution::new(16, 16)).unwrap();
        let mut src = TestPattern::new(8, 8);

        let packet = small.encode(&src.capture().unwrap(), 0).unwrap().remove(0);
        assert!(matches!(dec.decode(&packet.data), Err(LumenError::DecodeFailed(_))));
    }

    #[test]
    fn unusable_stream_size_fails_to_open() {
        assert!(matches!(
            DecoderSession::open(CodecKind::PlanarZstd, Resolution::new(0, 720)),
            Err(LumenError::CodecOpenFailed(_))
        ));
    }
}

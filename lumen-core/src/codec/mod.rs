//! Video codec sessions.
//!
//! A codec is consumed through two narrow seams that mirror the
//! submit/drain contract of common codec libraries:
//!
//! - [`PictureEncoder`]: submit a picture (or end-of-stream), then
//!   drain zero or more packets.
//! - [`PictureDecoder`]: submit a packet, then drain zero or more
//!   pictures.
//!
//! `Ok(None)` from a drain call means "needs more input" (or fully
//! drained after end-of-stream) and is never an error.
//!
//! [`EncoderSession`] and [`DecoderSession`] own one backend each and
//! serialize every call into it behind a mutex, since a codec context
//! is not reentrant.

pub mod decoder;
pub mod encoder;
pub mod planar;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::convert::Picture;
use crate::error::LumenError;
use crate::frame::{EncodedPacket, Resolution};

pub use decoder::DecoderSession;
pub use encoder::EncoderSession;

// ── CodecKind ────────────────────────────────────────────────────

/// Codecs built into this binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecKind {
    /// Planar YUV 4:2:0, intra + XOR inter frames, zstd entropy stage.
    PlanarZstd,
}

impl CodecKind {
    pub const fn name(self) -> &'static str {
        match self {
            CodecKind::PlanarZstd => "planar-zstd",
        }
    }

    /// Look a codec up by name.
    ///
    /// Fails with [`LumenError::CodecUnavailable`] for anything not
    /// compiled in.
    pub fn from_name(name: &str) -> Result<Self, LumenError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "planar-zstd" | "planar" => Ok(CodecKind::PlanarZstd),
            other => Err(LumenError::CodecUnavailable(format!(
                "{other:?} is not built in (available: planar-zstd)"
            ))),
        }
    }
}

impl fmt::Display for CodecKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── EncoderSettings ──────────────────────────────────────────────

/// Encoder knobs, minus the frame size which comes from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderSettings {
    /// Codec name, see [`CodecKind::from_name`].
    pub codec: String,
    /// Nominal frame rate the bitrate budget is spread over.
    pub target_fps: u32,
    /// Target bits per second.
    pub bitrate: u64,
    /// Maximum pictures between keyframes.
    pub gop_size: u32,
    /// Bidirectional frames; the pipeline keeps these disabled.
    pub max_b_frames: u32,
    /// Codec-specific options, validated by the codec on open.
    pub params: BTreeMap<String, String>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        let mut params = BTreeMap::new();
        params.insert("speed".to_string(), "8".to_string());
        Self {
            codec: CodecKind::PlanarZstd.name().to_string(),
            target_fps: 30,
            bitrate: 3_000_000,
            gop_size: 60,
            max_b_frames: 0,
            params,
        }
    }
}

// ── Backend seams ────────────────────────────────────────────────

/// Encoding half of a codec backend.
pub trait PictureEncoder: Send {
    /// Submit one picture tagged with `pts`, or `None` for end of stream.
    fn send_picture(
        &mut self,
        picture: Option<&Picture>,
        pts: i64,
        force_keyframe: bool,
    ) -> Result<(), LumenError>;

    /// Drain the next ready packet.
    fn receive_packet(&mut self) -> Result<Option<EncodedPacket>, LumenError>;
}

/// Decoding half of a codec backend.
pub trait PictureDecoder: Send {
    /// Submit one packet's bytes.
    fn send_packet(&mut self, data: &[u8]) -> Result<(), LumenError>;

    /// Drain the next decoded picture and its presentation index.
    fn receive_picture(&mut self) -> Result<Option<(Picture, i64)>, LumenError>;
}

/// Open an encoder backend for `kind`.
pub fn open_encoder(
    kind: CodecKind,
    resolution: Resolution,
    settings: &EncoderSettings,
) -> Result<Box<dyn PictureEncoder>, LumenError> {
    match kind {
        CodecKind::PlanarZstd => Ok(Box::new(planar::PlanarEncoder::open(resolution, settings)?)),
    }
}

/// Open a decoder backend for `kind` producing pictures of `resolution`.
pub fn open_decoder(kind: CodecKind, resolution: Resolution) -> Result<Box<dyn PictureDecoder>, LumenError> {
    match kind {
        CodecKind::PlanarZstd => Ok(Box::new(planar::PlanarDecoder::new(resolution)?)),
    }
}

//! Encoder session: one codec context, serialized access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use crate::codec::{CodecKind, EncoderSettings, PictureEncoder, open_encoder};
use crate::convert::{Picture, frame_to_picture};
use crate::error::LumenError;
use crate::frame::{EncodedPacket, RawFrame, Resolution};

struct EncoderState {
    backend: Box<dyn PictureEncoder>,
    /// Conversion scratch, reused for every frame.
    picture: Picture,
    last_pts: Option<i64>,
    flushed: bool,
}

/// Exclusive handle to one encoder context.
///
/// Cheap to clone; every clone refers to the same context. Calls from
/// different threads are serialized by an internal mutex, so at most
/// one `encode` runs at a time and a second caller blocks until the
/// first one returns.
#[derive(Clone)]
pub struct EncoderSession {
    inner: Arc<Mutex<Option<EncoderState>>>,
    force_keyframe: Arc<AtomicBool>,
    resolution: Resolution,
    kind: CodecKind,
}

impl EncoderSession {
    /// Open a context sized to `width x height`.
    pub fn open(width: u32, height: u32, settings: &EncoderSettings) -> Result<Self, LumenError> {
        let kind = CodecKind::from_name(&settings.codec)?;
        let resolution = Resolution::new(width, height);
        let backend = open_encoder(kind, resolution, settings)?;

        info!(
            codec = %kind,
            %resolution,
            bitrate = settings.bitrate,
            gop = settings.gop_size,
            "encoder opened"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(Some(EncoderState {
                backend,
                picture: Picture::new(width, height),
                last_pts: None,
                flushed: false,
            }))),
            force_keyframe: Arc::new(AtomicBool::new(false)),
            resolution,
            kind,
        })
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn kind(&self) -> CodecKind {
        self.kind
    }

    /// Make the next encoded picture a keyframe.
    pub fn request_keyframe(&self) {
        self.force_keyframe.store(true, Ordering::Relaxed);
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Convert, submit and drain: 0..N packets per frame.
    pub fn encode(&self, frame: &RawFrame, pts: i64) -> Result<Vec<EncodedPacket>, LumenError> {
        let mut guard = self.lock();
        let state = guard
            .as_mut()
            .ok_or_else(|| LumenError::EncodeFailed("encoder is closed".into()))?;

        if state.flushed {
            return Err(LumenError::EncodeFailed("encoder already flushed".into()));
        }
        if frame.resolution() != self.resolution {
            return Err(LumenError::EncodeFailed(format!(
                "frame is {}, session opened for {}",
                frame.resolution(),
                self.resolution
            )));
        }
        if let Some(last) = state.last_pts {
            if pts <= last {
                return Err(LumenError::EncodeFailed(format!(
                    "presentation index {pts} not after {last}"
                )));
            }
        }
        frame
            .validate()
            .map_err(|e| LumenError::EncodeFailed(e.to_string()))?;

        frame_to_picture(frame, &mut state.picture);
        let force = self.force_keyframe.swap(false, Ordering::Relaxed);
        if let Err(e) = state.backend.send_picture(Some(&state.picture), pts, force) {
            if force {
                self.force_keyframe.store(true, Ordering::Relaxed);
            }
            return Err(e);
        }
        state.last_pts = Some(pts);

        drain(state.backend.as_mut())
    }

    /// Signal end of stream and drain whatever the codec still holds.
    ///
    /// Later `encode` calls fail; a second flush returns nothing.
    pub fn flush(&self) -> Result<Vec<EncodedPacket>, LumenError> {
        let mut guard = self.lock();
        let Some(state) = guard.as_mut() else {
            return Ok(Vec::new());
        };
        if state.flushed {
            return Ok(Vec::new());
        }
        state.backend.send_picture(None, 0, false)?;
        state.flushed = true;
        let packets = drain(state.backend.as_mut())?;
        debug!(packets = packets.len(), "encoder flushed");
        Ok(packets)
    }

    /// Release the context. Returns `false` if it was already closed.
    ///
    /// Blocks while an `encode` is in flight on another thread.
    pub fn close(&self) -> bool {
        let closed = self.lock().take().is_some();
        if closed {
            debug!(codec = %self.kind, "encoder closed");
        }
        closed
    }

    fn lock(&self) -> MutexGuard<'_, Option<EncoderState>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn drain(backend: &mut dyn PictureEncoder) -> Result<Vec<EncodedPacket>, LumenError> {
    let mut packets = Vec::new();
    while let Some(packet) = backend.receive_packet()? {
        if !packet.is_empty() {
            packets.push(packet);
        }
    }
    Ok(packets)
}

impl std::fmt::Debug for EncoderSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderSession")
            .field("kind", &self.kind)
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────

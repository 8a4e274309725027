//! Reading half of the wire protocol.

use bytes::Bytes;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;

use crate::error::LumenError;
use crate::frame::Resolution;
use crate::wire::{StreamCodec, WireMessage};

/// Reconstructs the header and packets from an inbound stream.
pub struct WireReceiver<R> {
    inner: FramedRead<R, StreamCodec>,
    resolution: Option<Resolution>,
}

impl<R: AsyncRead + Unpin> WireReceiver<R> {
    pub fn new(io: R) -> Self {
        Self {
            inner: FramedRead::new(io, StreamCodec::new()),
            resolution: None,
        }
    }

    /// Read and parse the header line.
    pub async fn read_header(&mut self) -> Result<Resolution, LumenError> {
        if self.resolution.is_some() {
            return Err(LumenError::ProtocolViolation("header already read"));
        }
        match self.inner.next().await {
            Some(Ok(WireMessage::Header(resolution))) => {
                self.resolution = Some(resolution);
                Ok(resolution)
            }
            Some(Ok(WireMessage::Packet(_))) => {
                Err(LumenError::ProtocolViolation("packet before header"))
            }
            Some(Err(e)) => Err(e),
            None => Err(LumenError::TransportClosed(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed before header",
            ))),
        }
    }

    /// Next payload, or `None` when the peer closed cleanly between frames.
    ///
    /// A short read inside a frame is [`LumenError::TransportClosed`];
    /// an out-of-range length is [`LumenError::MalformedFrameLength`].
    /// Either way the stream cannot be resynchronised.
    pub async fn next_packet(&mut self) -> Result<Option<Bytes>, LumenError> {
        if self.resolution.is_none() {
            return Err(LumenError::ProtocolViolation("header not read yet"));
        }
        match self.inner.next().await {
            Some(Ok(WireMessage::Packet(payload))) => Ok(Some(payload)),
            Some(Ok(WireMessage::Header(_))) => {
                Err(LumenError::ProtocolViolation("second header"))
            }
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn into_inner(self) -> R {
        self.inner.into_inner()
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! Writing half of the wire protocol.

use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::error::LumenError;
use crate::frame::{EncodedPacket, Resolution};
use crate::wire::{LENGTH_PREFIX_SIZE, StreamCodec, WireMessage};

/// Sole writer of one outbound stream.
///
/// Each send is written and flushed before it returns, so a length
/// prefix and its payload are never interleaved with another packet.
pub struct WireSender<W> {
    inner: FramedWrite<W, StreamCodec>,
    header_sent: bool,
    packets_sent: u64,
    bytes_sent: u64,
}

impl<W: AsyncWrite + Unpin> WireSender<W> {
    pub fn new(io: W) -> Self {
        Self {
            inner: FramedWrite::new(io, StreamCodec::new()),
            header_sent: false,
            packets_sent: 0,
            bytes_sent: 0,
        }
    }

    /// Write the `"{width}x{height}\n"` line. Allowed exactly once.
    pub async fn send_header(&mut self, resolution: Resolution) -> Result<(), LumenError> {
        if self.header_sent {
            return Err(LumenError::ProtocolViolation("header already sent"));
        }
        self.inner.send(WireMessage::Header(resolution)).await?;
        self.header_sent = true;
        Ok(())
    }

    /// Write one length-prefixed packet; returns the bytes put on the wire.
    pub async fn send_packet(&mut self, packet: &EncodedPacket) -> Result<usize, LumenError> {
        if !self.header_sent {
            return Err(LumenError::ProtocolViolation("packet sent before header"));
        }
        self.inner
            .send(WireMessage::Packet(packet.data.clone()))
            .await?;

        let written = LENGTH_PREFIX_SIZE + packet.len();
        self.packets_sent += 1;
        self.bytes_sent += written as u64;
        Ok(written)
    }

    pub fn header_sent(&self) -> bool {
        self.header_sent
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    /// Total bytes written, header excluded.
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    /// Flush and shut down the write side.
    pub async fn close(&mut self) -> Result<(), LumenError> {
        SinkExt::<WireMessage>::close(&mut self.inner).await
    }

    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

// ── Tests ────────────────────────────────────────────────────────

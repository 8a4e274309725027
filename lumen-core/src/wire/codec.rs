//! `tokio_util` codec for the lumen stream.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::LumenError;
use crate::frame::Resolution;
use crate::wire::{LENGTH_PREFIX_SIZE, MAX_HEADER_LEN, MAX_PAYLOAD_SIZE};

/// One logical unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    /// `"{width}x{height}\n"`, first and only once.
    Header(Resolution),
    /// One length-prefixed codec packet.
    Packet(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    Header,
    Length,
    Payload(usize),
}

/// Stateful framing: header line first, then length-prefixed packets.
#[derive(Debug)]
pub struct StreamCodec {
    state: DecodeState,
}

impl StreamCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
        }
    }

    /// Codec for a stream whose header was already consumed.
    pub fn after_header() -> Self {
        Self {
            state: DecodeState::Length,
        }
    }

    /// Validate a length prefix before any payload is read.
    pub fn check_length(n: i32) -> Result<usize, LumenError> {
        if n <= 0 || n as usize > MAX_PAYLOAD_SIZE {
            return Err(LumenError::MalformedFrameLength(n));
        }
        Ok(n as usize)
    }

    fn decode_header(&mut self, src: &mut BytesMut) -> Result<Option<WireMessage>, LumenError> {
        let window = &src[..src.len().min(MAX_HEADER_LEN)];
        let Some(newline) = window.iter().position(|b| *b == b'\n') else {
            if src.len() >= MAX_HEADER_LEN {
                return Err(LumenError::InvalidHeader(format!(
                    "no line break within {MAX_HEADER_LEN} bytes"
                )));
            }
            return Ok(None);
        };

        let line = src.split_to(newline + 1);
        let text = std::str::from_utf8(&line[..newline])
            .map_err(|_| LumenError::InvalidHeader("header is not ASCII".into()))?;
        let resolution = text.parse::<Resolution>()?;

        self.state = DecodeState::Length;
        Ok(Some(WireMessage::Header(resolution)))
    }
}

impl Default for StreamCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for StreamCodec {
    type Item = WireMessage;
    type Error = LumenError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match self.state {
                DecodeState::Header => return self.decode_header(src),
                DecodeState::Length => {
                    if src.len() < LENGTH_PREFIX_SIZE {
                        return Ok(None);
                    }
                    let n = src.get_i32_le();
                    self.state = DecodeState::Payload(Self::check_length(n)?);
                }
                DecodeState::Payload(n) => {
                    if src.len() < n {
                        src.reserve(n - src.len());
                        return Ok(None);
                    }
                    self.state = DecodeState::Length;
                    return Ok(Some(WireMessage::Packet(src.split_to(n).freeze())));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(message) = self.decode(src)? {
            return Ok(Some(message));
        }
        match self.state {
            DecodeState::Length if src.is_empty() => Ok(None),
            DecodeState::Header if src.is_empty() => Ok(None),
            _ => Err(LumenError::TransportClosed(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream closed mid-frame",
            ))),
        }
    }
}

impl Encoder<WireMessage> for StreamCodec {
    type Error = LumenError;

    fn encode(&mut self, item: WireMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            WireMessage::Header(resolution) => {
                let line = format!("{}x{}\n", resolution.width, resolution.height);
                if line.len() > MAX_HEADER_LEN {
                    return Err(LumenError::InvalidHeader(line.trim_end().to_string()));
                }
                dst.extend_from_slice(line.as_bytes());
            }
            WireMessage::Packet(payload) => {
                if payload.is_empty() {
                    return Err(LumenError::ProtocolViolation("empty payload"));
                }
                if payload.len() > MAX_PAYLOAD_SIZE {
                    return Err(LumenError::PayloadTooLarge {
                        size: payload.len(),
                        max: MAX_PAYLOAD_SIZE,
                    });
                }
                dst.reserve(LENGTH_PREFIX_SIZE + payload.len());
                dst.put_i32_le(payload.len() as i32);
                dst.extend_from_slice(&payload);
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(n: i32, payload: &[u8]) -> Vec<u8> {
        let mut v = n.to_le_bytes().to_vec();
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn header_then_packet_in_one_segment() {
        let payload: Vec<u8> = (0..100u8).collect();
        let mut src = BytesMut::from(&b"1920x1080\n"[..]);
        src.extend_from_slice(&framed(100, &payload));

        let mut codec = StreamCodec::new();
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(WireMessage::Header(Resolution::new(1920, 1080)))
        );
        assert_eq!(
            codec.decode(&mut src).unwrap(),
            Some(WireMessage::Packet(Bytes::from(payload)))
        );
        assert!(src.is_empty());
        assert_eq!(codec.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn byte_at_a_time() {
        let mut wire = b"64x48\n".to_vec();
        wire.extend_from_slice(&framed(3, b"abc"));
        wire.extend_from_slice(&framed(1, b"z"));

        let mut codec = StreamCodec::new();
        let mut src = BytesMut::new();
        let mut out = Vec::new();
        for b in wire {
            src.put_u8(b);
            while let Some(m) = codec.decode(&mut src).unwrap() {
                out.push(m);
            }
        }
        assert_eq!(
            out,
            vec![
                WireMessage::Header(Resolution::new(64, 48)),
                WireMessage::Packet(Bytes::from_static(b"abc")),
                WireMessage::Packet(Bytes::from_static(b"z")),
            ]
        );
    }

    #[test]
    fn invalid_lengths_rejected_before_payload() {
        for n in [0, -1, (MAX_PAYLOAD_SIZE + 1) as i32, i32::MIN] {
            let mut codec = StreamCodec::after_header();
            let mut src = BytesMut::from(&n.to_le_bytes()[..]);
            match codec.decode(&mut src) {
                Err(LumenError::MalformedFrameLength(got)) => assert_eq!(got, n),
                other => panic!("length {n}: expected MalformedFrameLength, got {other:?}"),
            }
            assert!(src.capacity() < MAX_PAYLOAD_SIZE);
        }
    }

    #[test]
    fn max_length_is_accepted() {
        let n = MAX_PAYLOAD_SIZE as i32;
        assert_eq!(StreamCodec::check_length(n).unwrap(), MAX_PAYLOAD_SIZE);
        assert_eq!(StreamCodec::check_length(1).unwrap(), 1);
    }

    #[test]
    fn header_without_newline_is_invalid() {
        let mut codec = StreamCodec::new();
        let mut src = BytesMut::from(&[b'9'; MAX_HEADER_LEN][..]);
        assert!(matches!(codec.decode(&mut src), Err(LumenError::InvalidHeader(_))));

        let mut codec = StreamCodec::new();
        let mut src = BytesMut::from(&b"1920by1080\n"[..]);
        assert!(matches!(codec.decode(&mut src), Err(LumenError::InvalidHeader(_))));
    }

    #[test]
    fn short_header_waits_for_more() {
        let mut codec = StreamCodec::new();
        let mut src = BytesMut::from(&b"1920x10"[..]);
        assert_eq!(codec.decode(&mut src).unwrap(), None);
    }

    #[test]
    fn eof_inside_frame_is_transport_closed() {
        let mut codec = StreamCodec::after_header();
        let mut src = BytesMut::from(&[100u8, 0][..]);
        assert!(matches!(
            codec.decode_eof(&mut src),
            Err(LumenError::TransportClosed(_))
        ));

        let mut codec = StreamCodec::after_header();
        let mut src = BytesMut::from(&framed(10, b"short")[..]);
        assert!(codec.decode_eof(&mut src).is_err());

        let mut codec = StreamCodec::after_header();
        assert_eq!(codec.decode_eof(&mut BytesMut::new()).unwrap(), None);
    }

    #[test]
    fn encode_layout() {
        let mut codec = StreamCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(WireMessage::Header(Resolution::new(1920, 1080)), &mut dst)
            .unwrap();
        codec
            .encode(WireMessage::Packet(Bytes::from_static(b"hello")), &mut dst)
            .unwrap();

        let mut expected = b"1920x1080\n".to_vec();
        expected.extend_from_slice(&[5, 0, 0, 0]);
        expected.extend_from_slice(b"hello");
        assert_eq!(&dst[..], &expected[..]);
    }

    #[test]
    fn encode_rejects_bad_payloads() {
        let mut codec = StreamCodec::new();
        let mut dst = BytesMut::new();
        assert!(matches!(
            codec.encode(WireMessage::Packet(Bytes::new()), &mut dst),
            Err(LumenError::ProtocolViolation(_))
        ));
        let big = Bytes::from(vec![0u8; MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(
            codec.encode(WireMessage::Packet(big), &mut dst),
            Err(LumenError::PayloadTooLarge { .. })
        ));
        assert!(dst.is_empty());
    }
}

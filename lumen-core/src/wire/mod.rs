//! Length-prefixed wire protocol over an ordered byte stream.
//!
//! One direction, sender → receiver:
//!
//! ```text
//! header:  "{width}x{height}\n"          (ASCII, once, ≤ 32 bytes)
//! frame:   length: i32 (LE)              (1 ..= MAX_PAYLOAD_SIZE)
//!          payload: [u8; length]         (one codec packet)
//! ```
//!
//! There are no frame markers beyond the length prefix, no checksums
//! and no per-frame timestamps; decode order is presentation order.
//!
//! [`StreamCodec`] is the `tokio_util` framing for both directions.
//! [`WireSender`] and [`WireReceiver`] wrap it with the ordering rules
//! (header exactly once, before any packet).

pub mod codec;
pub mod receiver;
pub mod sender;

pub use codec::{StreamCodec, WireMessage};
pub use receiver::WireReceiver;
pub use sender::WireSender;

/// Largest accepted payload (10 MiB).
pub const MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Byte budget for the header line, newline included.
pub const MAX_HEADER_LEN: usize = 32;

/// Size of the little-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

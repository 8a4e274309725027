//! Domain-specific error types for the lumen pipeline.
//!
//! All fallible operations return `Result<T, LumenError>`.
//! Per-frame failures (capture, encode, decode) are recovered by the
//! loop that owns them; connection-level failures end only the owning
//! session or pipeline.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for lumen.
#[derive(Debug, Error)]
pub enum LumenError {
    // ── Capture Errors ───────────────────────────────────────────
    /// The platform capture service could not produce a frame.
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    // ── Codec Errors ─────────────────────────────────────────────
    /// The requested codec is not built into this binary.
    #[error("codec unavailable: {0}")]
    CodecUnavailable(String),

    /// The codec rejected the supplied configuration.
    #[error("codec open failed: {0}")]
    CodecOpenFailed(String),

    /// A single picture could not be encoded.
    #[error("encode failed: {0}")]
    EncodeFailed(String),

    /// A single packet could not be decoded.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    // ── Protocol Errors ──────────────────────────────────────────
    /// A received length prefix was outside `[1, MAX_PAYLOAD_SIZE]`.
    #[error("malformed frame length: {0}")]
    MalformedFrameLength(i32),

    /// The `{width}x{height}` stream header could not be parsed.
    #[error("invalid stream header: {0}")]
    InvalidHeader(String),

    /// An outbound payload does not fit the length-prefix limits.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A stream was used out of protocol order.
    #[error("protocol violation: {0}")]
    ProtocolViolation(&'static str),

    // ── Connection Errors ────────────────────────────────────────
    /// The byte stream was closed or failed mid-operation.
    #[error("transport closed: {0}")]
    TransportClosed(#[from] std::io::Error),

    /// The listening socket could not be bound.
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// An operation exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl LumenError {
    /// Whether this error ends the pipeline or session that hit it.
    ///
    /// Capture, encode and decode failures only cost one unit of work.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            LumenError::CaptureUnavailable(_)
                | LumenError::EncodeFailed(_)
                | LumenError::DecodeFailed(_)
                | LumenError::PayloadTooLarge { .. }
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for LumenError {
    fn from(s: String) -> Self {
        LumenError::Other(s)
    }
}

impl From<&str> for LumenError {
    fn from(s: &str) -> Self {
        LumenError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for LumenError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        LumenError::ChannelClosed
    }
}

impl From<tokio::task::JoinError> for LumenError {
    fn from(e: tokio::task::JoinError) -> Self {
        LumenError::Other(format!("worker task failed: {e}"))
    }
}

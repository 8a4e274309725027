//! # lumen-core
//!
//! Real-time screen mirroring over a single TCP stream.
//!
//! This crate contains:
//! - **Frames**: `RawFrame`, `EncodedPacket`, `Resolution`, `PixelFormat`
//! - **Capture**: `ScreenSource` seam, paced capture loop, DXGI and test-pattern sources
//! - **Queue**: `FrameQueue`, the bounded drop-oldest relay between capture and encode
//! - **Codec**: `EncoderSession` / `DecoderSession` over the built-in `planar-zstd` codec
//! - **Wire**: `StreamCodec`, `WireSender`, `WireReceiver` for the length-prefixed protocol
//! - **Pipelines**: `ScreenSender` (capture → send) and `ScreenServer` (accept → render)
//! - **Observability**: `MetricsSink`, `ThroughputMeter`, `StatusBoard`
//! - **Error**: `LumenError`, a typed `thiserror`-based error hierarchy

pub mod capture;
pub mod codec;
pub mod convert;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod queue;
pub mod sender;
pub mod server;
pub mod status;
pub mod wire;

// ── Re-exports for ergonomic usage ───────────────────────────────

#[cfg(target_os = "windows")]
pub use capture::DxgiSource;
pub use capture::{CaptureStats, ScreenSource, TestPattern, spawn_capture};
pub use codec::{CodecKind, DecoderSession, EncoderSession, EncoderSettings};
pub use convert::Picture;
pub use error::LumenError;
pub use frame::{EncodedPacket, PixelFormat, RawFrame, Resolution};
pub use metrics::{MetricsSink, MetricsSnapshot, ThroughputMeter};
pub use queue::FrameQueue;
pub use sender::{ScreenSender, SenderConfig, SenderStatsSnapshot};
pub use server::{RenderedFrame, ScreenServer, ServerConfig, ServerStats, ViewerEvent};
pub use status::{Severity, Status, StatusBoard};
pub use wire::{MAX_PAYLOAD_SIZE, StreamCodec, WireMessage, WireReceiver, WireSender};

//! # lumen-viewer: screen mirroring receiver
//!
//! Listens for one `lumen-sender` at a time (later connections are
//! served as independent sessions), decodes the stream and hands each
//! frame to a headless renderer that keeps the latest picture, refreshes
//! the status line and optionally writes PNG snapshots.

pub mod config;
pub mod render;

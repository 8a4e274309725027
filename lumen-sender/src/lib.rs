//! # lumen-sender: screen capture and streaming client
//!
//! Captures the local screen (DXGI Desktop Duplication on Windows, a
//! synthetic test pattern elsewhere), encodes it and streams it over
//! one TCP connection to a `lumen-viewer`.
//!
//! The binary is the thin collaborator around
//! [`lumen_core::ScreenSender`]: it turns CLI flags and the TOML file
//! into a [`lumen_core::SenderConfig`], picks the capture source and
//! maps Ctrl-C to `stop`.

pub mod config;
pub mod source;

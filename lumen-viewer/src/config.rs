//! Viewer configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lumen_core::ServerConfig;

use crate::render::RenderConfig;

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Display settings.
    pub display: DisplayConfig,
    /// Decoder settings.
    pub decoder: DecoderConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Interface to bind.
    pub bind_address: String,
    /// TCP port to listen on.
    pub port: u16,
}

/// Display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Frames buffered between decoder and renderer before dropping.
    pub render_buffer: usize,
    /// Status line refresh period.
    pub status_interval_ms: u64,
    /// Where to write PNG snapshots; empty disables them.
    pub snapshot_path: String,
    /// Minimum time between snapshots.
    pub snapshot_interval_ms: u64,
}

/// Decoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Codec the sender uses.
    pub codec: String,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 5000,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            render_buffer: 3,
            status_interval_ms: 500,
            snapshot_path: String::new(),
            snapshot_interval_ms: 1000,
        }
    }
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            codec: "planar-zstd".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            bind_address: self.network.bind_address.clone(),
            port: self.network.port,
            codec: self.decoder.codec.clone(),
            event_buffer: self.display.render_buffer.max(1),
            ..ServerConfig::default()
        }
    }

    pub fn to_render_config(&self) -> RenderConfig {
        let snapshot_path = self.display.snapshot_path.trim();
        RenderConfig {
            status_interval: Duration::from_millis(self.display.status_interval_ms.max(10)),
            snapshot_path: (!snapshot_path.is_empty()).then(|| PathBuf::from(snapshot_path)),
            snapshot_interval: Duration::from_millis(self.display.snapshot_interval_ms),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

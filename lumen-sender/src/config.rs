//! Configuration for the sender.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use lumen_core::{EncoderSettings, SenderConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderAppConfig {
    /// Where to stream to.
    pub network: NetworkConfig,
    /// Screen capture settings.
    pub capture: CaptureConfig,
    /// Codec knobs.
    pub encoder: EncoderConfig,
    /// Frame queue watermarks.
    pub queue: QueueConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Viewer host name or IP.
    pub address: String,
    /// Viewer TCP port.
    pub port: u16,
    /// Give up connecting after this long.
    pub connect_timeout_ms: u64,
}

/// Screen capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// `"dxgi"` (Windows only) or `"pattern"`.
    pub source: String,
    /// Monitor index to capture (0 = primary).
    pub monitor_index: u32,
    /// DXGI acquire timeout in milliseconds.
    pub capture_timeout_ms: u32,
    /// Test pattern width.
    pub width: u32,
    /// Test pattern height.
    pub height: u32,
    /// Target frames per second (1..=60).
    pub fps: u32,
}

/// Encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub codec: String,
    /// Target bits per second.
    pub bitrate: u64,
    pub gop_size: u32,
    pub max_b_frames: u32,
    /// 0 (smallest) ..= 8 (fastest).
    pub speed: u8,
    /// Packets the codec holds back.
    pub delay: u32,
}

/// Frame queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Trimming starts once the queue grows past this.
    pub high_watermark: usize,
    /// Trimming stops at this length.
    pub low_watermark: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Seconds between statistics lines; 0 disables them.
    pub stats_interval_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".into(),
            port: 5000,
            connect_timeout_ms: 5000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: if cfg!(target_os = "windows") { "dxgi" } else { "pattern" }.into(),
            monitor_index: 0,
            capture_timeout_ms: 100,
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        let defaults = EncoderSettings::default();
        Self {
            codec: defaults.codec,
            bitrate: defaults.bitrate,
            gop_size: defaults.gop_size,
            max_b_frames: defaults.max_b_frames,
            speed: 8,
            delay: 0,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            high_watermark: 5,
            low_watermark: 2,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            stats_interval_secs: 5,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl SenderAppConfig {
    /// Load configuration from a TOML file, falling back to defaults.
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

    /// Capture fps clamped to 1..=60.
    pub fn fps(&self) -> u32 {
        self.capture.fps.clamp(1, 60)
    }

    pub fn encoder_settings(&self) -> EncoderSettings {
        let mut params = BTreeMap::new();
        params.insert("speed".to_string(), self.encoder.speed.to_string());
        if self.encoder.delay > 0 {
            params.insert("delay".to_string(), self.encoder.delay.to_string());
        }
        EncoderSettings {
            codec: self.encoder.codec.clone(),
            target_fps: self.fps(),
            bitrate: self.encoder.bitrate,
            gop_size: self.encoder.gop_size,
            max_b_frames: self.encoder.max_b_frames,
            params,
        }
    }

    /// Convert into the pipeline's [`SenderConfig`].
    pub fn to_sender_config(&self) -> SenderConfig {
        SenderConfig {
            address: self.network.address.clone(),
            port: self.network.port,
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
            capture_interval: Duration::from_millis(1000 / self.fps() as u64),
            high_watermark: self.queue.high_watermark,
            low_watermark: self.queue.low_watermark,
            encoder: self.encoder_settings(),
            ..SenderConfig::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

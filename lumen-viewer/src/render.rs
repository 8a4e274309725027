//! Headless renderer: consumes viewer events on its own task.
//!
//! Keeps the most recent frame, drives the status line on a fixed
//! cadence from the metrics sink and, when configured, writes the
//! latest frame as a PNG snapshot.

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::{ImageFormat, RgbaImage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use lumen_core::{MetricsSink, RawFrame, Resolution, StatusBoard, ViewerEvent};

#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub status_interval: Duration,
    pub snapshot_path: Option<PathBuf>,
    pub snapshot_interval: Duration,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            status_interval: Duration::from_millis(500),
            snapshot_path: None,
            snapshot_interval: Duration::from_secs(1),
        }
    }
}

/// Convert any packed frame into an RGBA image.
pub fn frame_to_image(frame: &RawFrame) -> RgbaImage {
    RgbaImage::from_fn(frame.width, frame.height, |x, y| {
        let (r, g, b) = frame.rgb(x, y);
        image::Rgba([r, g, b, 255])
    })
}

/// Write `frame` to `path` as PNG.
pub fn save_snapshot(frame: &RawFrame, path: &Path) -> Result<(), image::ImageError> {
    frame_to_image(frame).save_with_format(path, ImageFormat::Png)
}

/// State of the display side of the viewer.
pub struct FrameRenderer {
    config: RenderConfig,
    status: Arc<StatusBoard>,
    metrics: Arc<MetricsSink>,
    peer: Option<SocketAddr>,
    resolution: Option<Resolution>,
    latest: Option<RawFrame>,
    last_snapshot: Option<Instant>,
    frames: u64,
}

impl FrameRenderer {
    pub fn new(config: RenderConfig, status: Arc<StatusBoard>, metrics: Arc<MetricsSink>) -> Self {
        Self {
            config,
            status,
            metrics,
            peer: None,
            resolution: None,
            latest: None,
            last_snapshot: None,
            frames: 0,
        }
    }

    /// Apply one event. Returns a frame to snapshot, if one is due.
    pub fn handle(&mut self, event: ViewerEvent) -> Option<RawFrame> {
        match event {
            ViewerEvent::ClientConnected { peer } => {
                info!(%peer, "client connected");
                self.peer = Some(peer);
                self.resolution = None;
                None
            }
            ViewerEvent::SessionStarted { peer, resolution } => {
                info!(%peer, %resolution, "remote screen");
                self.peer = Some(peer);
                self.resolution = Some(resolution);
                None
            }
            ViewerEvent::FrameRendered(rendered) => {
                self.frames += 1;
                debug!(
                    sequence = rendered.frame.sequence,
                    fps = rendered.fps,
                    kb = rendered.frame_size_kb,
                    "frame"
                );
                let due = self.snapshot_due(Instant::now());
                self.latest = Some(rendered.frame);
                if due {
                    self.last_snapshot = Some(Instant::now());
                    self.latest.clone()
                } else {
                    None
                }
            }
            ViewerEvent::ClientDisconnected { peer, reason } => {
                match reason {
                    Some(reason) => info!(%peer, "client disconnected: {reason}"),
                    None => info!(%peer, "client disconnected"),
                }
                if self.peer == Some(peer) {
                    self.peer = None;
                    self.resolution = None;
                }
                None
            }
        }
    }

    fn snapshot_due(&self, now: Instant) -> bool {
        if self.config.snapshot_path.is_none() {
            return false;
        }
        match self.last_snapshot {
            Some(last) => now.saturating_duration_since(last) >= self.config.snapshot_interval,
            None => true,
        }
    }

    /// Periodic status refresh, independent of frame arrival.
    pub fn refresh_status(&self) {
        let snapshot = self.metrics.refresh();
        if self.resolution.is_some() {
            self.status.active(format!(
                "receiving | frame size: {} KB | FPS: {}",
                snapshot.last_frame_size_kb, snapshot.fps
            ));
        }
    }

    pub fn latest(&self) -> Option<&RawFrame> {
        self.latest.as_ref()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Consume events until `shutdown` resolves or the channel closes.
    pub async fn run<F>(mut self, mut events: mpsc::Receiver<ViewerEvent>, shutdown: F) -> Self
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.status_interval);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if let Some(frame) = self.handle(event) {
                        self.write_snapshot(frame);
                    }
                }
                _ = ticker.tick() => self.refresh_status(),
            }
        }
        self
    }

    fn write_snapshot(&self, frame: RawFrame) {
        let Some(path) = self.config.snapshot_path.clone() else {
            return;
        };
        tokio::task::spawn_blocking(move || {
            if let Err(e) = save_snapshot(&frame, &path) {
                warn!("snapshot {} failed: {e}", path.display());
            }
        });
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::{PixelFormat, RenderedFrame, Severity};

    fn renderer(config: RenderConfig) -> FrameRenderer {
        FrameRenderer::new(
            config,
            Arc::new(StatusBoard::new("idle")),
            Arc::new(MetricsSink::new()),
        )
    }

    fn rendered(sequence: u64) -> ViewerEvent {
        let mut frame = RawFrame::blank(4, 2, PixelFormat::Bgra8);
        frame.sequence = sequence;
        ViewerEvent::FrameRendered(RenderedFrame {
            frame,
            fps: 30,
            frame_size_kb: 12,
        })
    }

    fn peer() -> SocketAddr {
        "10.0.0.2:51000".parse().unwrap()
    }

    #[test]
    fn image_conversion_respects_layout() {
        let mut frame = RawFrame::blank(2, 1, PixelFormat::Bgra8);
        frame.data.copy_from_slice(&[10, 20, 30, 255, 1, 2, 3, 255]);
        let img = frame_to_image(&frame);
        assert_eq!(img.get_pixel(0, 0).0, [30, 20, 10, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [3, 2, 1, 255]);
    }

    #[test]
    fn tracks_session_and_latest_frame() {
        let mut r = renderer(RenderConfig::default());
        r.handle(ViewerEvent::ClientConnected { peer: peer() });
        r.handle(ViewerEvent::SessionStarted {
            peer: peer(),
            resolution: Resolution::new(4, 2),
        });
        assert!(r.handle(rendered(7)).is_none());
        assert_eq!(r.latest().map(|f| f.sequence), Some(7));
        assert_eq!(r.frames(), 1);

        r.handle(ViewerEvent::ClientDisconnected {
            peer: peer(),
            reason: None,
        });
        assert!(r.resolution().is_none());
    }

    #[test]
    fn snapshots_are_rate_limited() {
        let mut r = renderer(RenderConfig {
            snapshot_path: Some(PathBuf::from("unused.png")),
            snapshot_interval: Duration::from_secs(3600),
            ..RenderConfig::default()
        });
        assert!(r.handle(rendered(0)).is_some());
        assert!(r.handle(rendered(1)).is_none());
    }

    #[test]
    fn status_line_only_while_receiving() {
        let status = Arc::new(StatusBoard::new("listening on port 5000"));
        let metrics = Arc::new(MetricsSink::new());
        let mut r = FrameRenderer::new(RenderConfig::default(), status.clone(), metrics.clone());

        r.refresh_status();
        assert_eq!(status.current().text, "listening on port 5000");

        r.handle(ViewerEvent::SessionStarted {
            peer: peer(),
            resolution: Resolution::new(4, 2),
        });
        metrics.record_frame(3 * 1024);
        r.refresh_status();
        let current = status.current();
        assert_eq!(current.severity, Severity::Active);
        assert_eq!(current.text, "receiving | frame size: 3 KB | FPS: 1");
    }

    #[test]
    fn snapshot_writes_png() {
        let path = std::env::temp_dir().join(format!("lumen-snapshot-{}.png", std::process::id()));
        let frame = RawFrame::blank(8, 8, PixelFormat::Rgb8);
        save_snapshot(&frame, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let _ = std::fs::remove_file(&path);
    }
}

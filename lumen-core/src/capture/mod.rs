//! Screen sampling and the paced capture loop.
//!
//! A [`ScreenSource`] is the platform capture service: it hands back
//! one full-screen [`RawFrame`] per call. [`run_capture_loop`] drives a
//! source at a target interval, stamps each frame with a capture
//! sequence number and pushes it into the [`FrameQueue`].
//!
//! | Source        | Platform | Notes                                  |
//! |---------------|----------|----------------------------------------|
//! | `DxgiSource`  | Windows  | Desktop Duplication, BGRA              |
//! | `TestPattern` | any      | Moving gradient, used headless / tests |

#[cfg(target_os = "windows")]
pub mod dxgi;
pub mod pattern;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::LumenError;
use crate::frame::{RawFrame, Resolution};
use crate::queue::FrameQueue;

#[cfg(target_os = "windows")]
pub use dxgi::DxgiSource;
pub use pattern::TestPattern;

/// Nominal interval between capture starts (30 fps).
pub const DEFAULT_CAPTURE_INTERVAL: Duration = Duration::from_millis(33);

// ── ScreenSource ─────────────────────────────────────────────────

/// A platform service that samples the whole screen.
///
/// Sources stay on the thread that opened them, see [`spawn_capture`].
pub trait ScreenSource: 'static {
    /// Fixed output dimensions for the lifetime of the source.
    fn resolution(&self) -> Resolution;

    /// Produce one top-down frame.
    ///
    /// Fails with [`LumenError::CaptureUnavailable`] when no frame can
    /// be produced right now; callers treat that as transient.
    fn capture(&mut self) -> Result<RawFrame, LumenError>;
}

impl ScreenSource for Box<dyn ScreenSource> {
    fn resolution(&self) -> Resolution {
        (**self).resolution()
    }

    fn capture(&mut self) -> Result<RawFrame, LumenError> {
        (**self).capture()
    }
}

// ── CaptureStats ─────────────────────────────────────────────────

/// Counters updated by the capture loop.
#[derive(Debug, Default)]
pub struct CaptureStats {
    pub captured: AtomicU64,
    pub dropped: AtomicU64,
    pub errors: AtomicU64,
}

impl CaptureStats {
    pub fn captured(&self) -> u64 {
        self.captured.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

// ── Pacing ───────────────────────────────────────────────────────

/// How long to sleep after an iteration that started at `loop_start`.
///
/// `max(0, interval - elapsed)`: a slow capture eats into its own
/// sleep so the long-run cadence stays near `interval`.
pub fn pace_delay(loop_start: Instant, now: Instant, interval: Duration) -> Duration {
    interval.saturating_sub(now.saturating_duration_since(loop_start))
}

// ── Capture loop ─────────────────────────────────────────────────

/// Blocking capture loop; run it on a dedicated thread
/// (e.g. `tokio::task::spawn_blocking`).
///
/// Returns when `cancel` fires. Capture failures are logged and the
/// loop carries on with the next sample.
pub fn run_capture_loop<S: ScreenSource>(
    mut source: S,
    queue: Arc<FrameQueue>,
    stats: Arc<CaptureStats>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut sequence: u64 = 0;
    debug!(?interval, resolution = %source.resolution(), "capture loop started");

    while !cancel.is_cancelled() {
        let loop_start = Instant::now();

        match source.capture() {
            Ok(mut frame) => {
                frame.sequence = sequence;
                frame.timestamp = loop_start;
                sequence += 1;

                let dropped = queue.push(frame);
                stats.captured.fetch_add(1, Ordering::Relaxed);
                if dropped > 0 {
                    stats.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
                    debug!(dropped, "encoder behind; discarded stale frames");
                }
            }
            Err(e) => {
                stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!("capture failed: {e}");
            }
        }

        let delay = pace_delay(loop_start, Instant::now(), interval);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    debug!(frames = sequence, "capture loop stopped");
}

/// Open a source on a blocking-pool thread and run the capture loop
/// there.
///
/// Resolves with the thread handle and the source's resolution once
/// `open` succeeded, or with `open`'s error after the thread exited.
pub async fn spawn_capture<F, S>(
    open: F,
    queue: Arc<FrameQueue>,
    stats: Arc<CaptureStats>,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<(JoinHandle<()>, Resolution), LumenError>
where
    F: FnOnce() -> Result<S, LumenError> + Send + 'static,
    S: ScreenSource,
{
    let (ready_tx, ready_rx) = oneshot::channel();
    let handle = tokio::task::spawn_blocking(move || {
        let source = match open() {
            Ok(source) => source,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        if ready_tx.send(Ok(source.resolution())).is_err() {
            return;
        }
        run_capture_loop(source, queue, stats, interval, cancel);
    });

    match ready_rx.await {
        Ok(Ok(resolution)) => Ok((handle, resolution)),
        Ok(Err(e)) => {
            let _ = handle.await;
            Err(e)
        }
        Err(_) => match handle.await {
            Err(e) => Err(e.into()),
            Ok(()) => Err(LumenError::ChannelClosed),
        },
    }
}

// ── Tests ────────────────────────────────────────────────────────

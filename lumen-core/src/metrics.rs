//! Rolling frame-rate / frame-size metrics and outbound throughput.
//!
//! [`MetricsSink`] is the viewer-side sink: every rendered frame is
//! recorded with its payload size, and the rate is the number of
//! arrivals inside the last second (an integer, not a division by a
//! sub-second span). Snapshots are published on a `watch` channel so a
//! UI can poll or await them without touching the pipeline.
//!
//! [`ThroughputMeter`] is the sender-side byte-rate estimator.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::watch;

/// Window both meters average over.
pub const METRICS_WINDOW: Duration = Duration::from_secs(1);

// ── MetricsSink ──────────────────────────────────────────────────

/// Read-only view of the receive metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Frames rendered during the last window.
    pub fps: u32,
    /// Payload size of the latest frame, `bytes / 1024`.
    pub last_frame_size_kb: u32,
    /// Frames rendered since the last reset.
    pub frames: u64,
}

/// Sliding-window frame-rate and frame-size tracker.
#[derive(Debug)]
pub struct MetricsSink {
    window: Duration,
    arrivals: Mutex<VecDeque<Instant>>,
    tx: watch::Sender<MetricsSnapshot>,
}

impl MetricsSink {
    pub fn new() -> Self {
        Self::with_window(METRICS_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        let (tx, _) = watch::channel(MetricsSnapshot::default());
        Self {
            window,
            arrivals: Mutex::new(VecDeque::with_capacity(128)),
            tx,
        }
    }

    /// Record a frame of `payload_bytes` that was just rendered.
    pub fn record_frame(&self, payload_bytes: usize) -> MetricsSnapshot {
        self.record_frame_at(Instant::now(), payload_bytes)
    }

    /// Record with an explicit arrival time (useful for testing).
    pub fn record_frame_at(&self, now: Instant, payload_bytes: usize) -> MetricsSnapshot {
        let fps = {
            let mut arrivals = self.lock();
            arrivals.push_back(now);
            evict(&mut arrivals, now, self.window);
            arrivals.len() as u32
        };

        let mut snapshot = MetricsSnapshot::default();
        self.tx.send_modify(|s| {
            s.fps = fps;
            s.last_frame_size_kb = (payload_bytes / 1024) as u32;
            s.frames += 1;
            snapshot = *s;
        });
        snapshot
    }

    /// Current rate, ageing out arrivals even when no frame comes in.
    pub fn observed_fps(&self) -> u32 {
        self.observed_fps_at(Instant::now())
    }

    pub fn observed_fps_at(&self, now: Instant) -> u32 {
        let fps = {
            let mut arrivals = self.lock();
            evict(&mut arrivals, now, self.window);
            arrivals.len() as u32
        };
        self.tx.send_if_modified(|s| {
            let changed = s.fps != fps;
            s.fps = fps;
            changed
        });
        fps
    }

    /// Latest published values; the rate may be stale, see [`Self::refresh`].
    pub fn snapshot(&self) -> MetricsSnapshot {
        *self.tx.borrow()
    }

    /// Age the window to now and return a fresh snapshot.
    pub fn refresh(&self) -> MetricsSnapshot {
        self.observed_fps();
        self.snapshot()
    }

    /// Forget everything; used when a new session replaces the old one.
    pub fn reset(&self) {
        self.lock().clear();
        self.tx.send_replace(MetricsSnapshot::default());
    }

    pub fn subscribe(&self) -> watch::Receiver<MetricsSnapshot> {
        self.tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.arrivals.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MetricsSink {
    fn default() -> Self {
        Self::new()
    }
}

fn evict(arrivals: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&ts) = arrivals.front() {
        if now.saturating_duration_since(ts) >= window {
            arrivals.pop_front();
        } else {
            break;
        }
    }
}

// ── ThroughputMeter ──────────────────────────────────────────────

/// Rolling-window byte-rate estimator.
///
/// Records `(timestamp, bytes)` samples and reports the bytes seen in
/// the most recent `window`, scaled to one second.
#[derive(Debug)]
pub struct ThroughputMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    total_bytes: u64,
}

impl ThroughputMeter {
    pub fn new() -> Self {
        Self::with_window(METRICS_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(256),
            window,
            total_bytes: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Bytes per second over the window ending at `now`.
    pub fn bytes_per_sec_at(&mut self, now: Instant) -> u64 {
        self.evict(now);
        let secs = self.window.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.total_bytes as f64 / secs) as u64
    }

    pub fn bytes_per_sec(&mut self) -> u64 {
        self.bytes_per_sec_at(Instant::now())
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.saturating_duration_since(ts) >= self.window {
                self.samples.pop_front();
                self.total_bytes = self.total_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for ThroughputMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn at_30fps(t0: Instant, k: u64) -> Instant {
        t0 + Duration::from_nanos(k * 1_000_000_000 / 30)
    }

    #[test]
    fn thirty_per_second_reads_thirty() {
        let sink = MetricsSink::new();
        let t0 = Instant::now();
        let mut last = MetricsSnapshot::default();
        for k in 0..90 {
            last = sink.record_frame_at(at_30fps(t0, k), 4096);
            if k >= 29 {
                assert_eq!(last.fps, 30, "frame {k}");
            }
        }
        assert_eq!(last.last_frame_size_kb, 4);
        assert_eq!(last.frames, 90);
        assert_eq!(sink.snapshot(), last);
    }

    #[test]
    fn idle_period_drops_rate_to_zero() {
        let sink = MetricsSink::new();
        let t0 = Instant::now();
        for k in 0..30 {
            sink.record_frame_at(at_30fps(t0, k), 1000);
        }
        let idle = at_30fps(t0, 29) + Duration::from_millis(1500);
        assert_eq!(sink.observed_fps_at(idle), 0);
        assert_eq!(sink.snapshot().fps, 0);
        // Size and count stay until reset.
        assert_eq!(sink.snapshot().frames, 30);
    }

    #[test]
    fn partial_window() {
        let sink = MetricsSink::new();
        let t0 = Instant::now();
        for k in 0..10 {
            sink.record_frame_at(t0 + Duration::from_millis(k * 10), 10);
        }
        assert_eq!(sink.observed_fps_at(t0 + Duration::from_millis(500)), 10);
        assert_eq!(sink.snapshot().last_frame_size_kb, 0);
    }

    #[test]
    fn reset_clears_everything() {
        let sink = MetricsSink::new();
        let mut rx = sink.subscribe();
        sink.record_frame(5000);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().frames, 1);

        sink.reset();
        assert_eq!(*rx.borrow_and_update(), MetricsSnapshot::default());
        assert_eq!(sink.observed_fps(), 0);
    }

    #[test]
    fn throughput_over_window() {
        let mut meter = ThroughputMeter::with_window(Duration::from_secs(1));
        let t0 = Instant::now();
        for k in 0..10 {
            meter.record_at(t0 + Duration::from_millis(k * 100), 1000);
        }
        assert_eq!(meter.bytes_per_sec_at(t0 + Duration::from_millis(950)), 10_000);
        assert_eq!(meter.bytes_per_sec_at(t0 + Duration::from_secs(5)), 0);
        assert_eq!(meter.sample_count(), 0);
    }

    #[test]
    fn throughput_evicts_old_samples() {
        let mut meter = ThroughputMeter::with_window(Duration::from_millis(500));
        let t0 = Instant::now();
        meter.record_at(t0, 1000);
        meter.record_at(t0 + Duration::from_secs(1), 500);
        assert_eq!(meter.sample_count(), 1);
    }
}

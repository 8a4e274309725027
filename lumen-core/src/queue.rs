//! Bounded relay between the capture loop and the encode worker.
//!
//! The queue never blocks. When a push leaves more than
//! `high_watermark` frames queued, the oldest frames are discarded
//! until at most `low_watermark` remain, so the consumer always works
//! on recent screen content instead of an ever-growing backlog.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::frame::RawFrame;

/// Default length above which a push triggers dropping.
pub const DEFAULT_HIGH_WATERMARK: usize = 5;
/// Default length the queue is trimmed down to.
pub const DEFAULT_LOW_WATERMARK: usize = 2;

/// Thread-safe FIFO of [`RawFrame`]s with an overflow-drop policy.
#[derive(Debug)]
pub struct FrameQueue {
    frames: Mutex<VecDeque<RawFrame>>,
    high_watermark: usize,
    low_watermark: usize,
    /// Frames discarded by the overflow policy since creation.
    dropped: AtomicU64,
}

impl FrameQueue {
    /// Queue with the default 5 / 2 watermarks.
    pub fn new() -> Self {
        Self::with_watermarks(DEFAULT_HIGH_WATERMARK, DEFAULT_LOW_WATERMARK)
    }

    /// Queue with custom watermarks. `low` is clamped to `high`.
    pub fn with_watermarks(high: usize, low: usize) -> Self {
        let high = high.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(high + 1)),
            high_watermark: high,
            low_watermark: low.min(high),
            dropped: AtomicU64::new(0),
        }
    }

    /// Append a frame, then apply the drop policy.
    ///
    /// Returns the number of frames discarded by this push.
    pub fn push(&self, frame: RawFrame) -> usize {
        let mut frames = self.lock();
        frames.push_back(frame);

        let mut dropped = 0;
        if frames.len() > self.high_watermark {
            while frames.len() > self.low_watermark {
                if let Some(old) = frames.pop_front() {
                    trace!(sequence = old.sequence, "dropping stale frame");
                    dropped += 1;
                }
            }
            self.dropped.fetch_add(dropped as u64, Ordering::Relaxed);
        }
        dropped
    }

    /// Take the oldest retained frame, if any. Never blocks on content.
    pub fn try_pop(&self) -> Option<RawFrame> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discard every queued frame, returning how many were removed.
    pub fn drain(&self) -> usize {
        let mut frames = self.lock();
        let n = frames.len();
        frames.clear();
        n
    }

    /// Total frames discarded by the overflow policy.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn high_watermark(&self) -> usize {
        self.high_watermark
    }

    pub fn low_watermark(&self) -> usize {
        self.low_watermark
    }

    // A poisoned lock only means a holder panicked mid-push; the
    // deque itself is still structurally valid.
    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<RawFrame>> {
        self.frames.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

//! # Context Statistics
//!
//! Written by the presentation loop once per frame, read by anyone holding
//! the `Arc`. Relaxed atomics: values are diagnostic and may be torn across
//! fields, never within one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Shared per-frame counters.
#[derive(Debug, Default)]
pub struct ContextStats {
    frames: AtomicU64,
    frame_delta_us: AtomicU64,
    frame_work_us: AtomicU64,
    swaps: AtomicU64,
    stale_frames: AtomicU64,
    overwritten_ticks: AtomicU64,
    draw_calls: AtomicU64,
    renderables: AtomicU64,
}

/// One frame's measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameSample {
    /// Time since the previous frame.
    pub delta: Duration,
    /// Time spent inside the frame.
    pub work: Duration,
    /// Successful buffer swaps so far.
    pub swaps: u64,
    /// Swaps that followed more than one stale frame.
    pub stale_frames: u64,
    /// Ticks replaced before the consumer took them.
    pub overwritten_ticks: u64,
    /// Draw calls issued by the backend.
    pub draw_calls: u64,
    /// Bound renderables.
    pub renderables: u64,
}

/// Point-in-time copy of [`ContextStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames rendered.
    pub frames: u64,
    /// Last frame sample.
    pub last: FrameSample,
}

fn micros(d: Duration) -> u64 {
    u64::try_from(d.as_micros()).unwrap_or(u64::MAX)
}

impl ContextStats {
    /// Zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one frame.
    pub fn record(&self, sample: &FrameSample) {
        self.frame_delta_us.store(micros(sample.delta), Ordering::Relaxed);
        self.frame_work_us.store(micros(sample.work), Ordering::Relaxed);
        self.swaps.store(sample.swaps, Ordering::Relaxed);
        self.stale_frames.store(sample.stale_frames, Ordering::Relaxed);
        self.overwritten_ticks.store(sample.overwritten_ticks, Ordering::Relaxed);
        self.draw_calls.store(sample.draw_calls, Ordering::Relaxed);
        self.renderables.store(sample.renderables, Ordering::Relaxed);
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.frames.load(Ordering::Relaxed),
            last: FrameSample {
                delta: Duration::from_micros(self.frame_delta_us.load(Ordering::Relaxed)),
                work: Duration::from_micros(self.frame_work_us.load(Ordering::Relaxed)),
                swaps: self.swaps.load(Ordering::Relaxed),
                stale_frames: self.stale_frames.load(Ordering::Relaxed),
                overwritten_ticks: self.overwritten_ticks.load(Ordering::Relaxed),
                draw_calls: self.draw_calls.load(Ordering::Relaxed),
                renderables: self.renderables.load(Ordering::Relaxed),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = ContextStats::new();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());

        let sample = FrameSample {
            delta: Duration::from_micros(8_333),
            work: Duration::from_micros(900),
            swaps: 4,
            stale_frames: 1,
            overwritten_ticks: 0,
            draw_calls: 12,
            renderables: 12,
        };
        stats.record(&sample);
        stats.record(&sample);

        let snap = stats.snapshot();
        assert_eq!(snap.frames, 2);
        assert_eq!(snap.last, sample);
    }
}

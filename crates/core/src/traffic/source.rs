//! Fixed-interval video frame scheduler.
//!
//! A `VideoSource` emits one frame per interval, at `start + n * interval`,
//! for as long as that time is strictly before `stop`. Tick times are computed
//! from the frame index rather than accumulated, so long runs do not drift.
//!
//! The source holds the id of its one pending tick so that stopping it can
//! cancel that event: nothing from a stopped source runs afterwards.

use super::sampler::FrameSizeSampler;
use super::segmenter::DispatchOutcome;
use crate::scheduler::{EventId, EventQueue};
use crate::time::SimTime;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

/// One generated frame, consumed immediately by the segmenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameJob {
    /// Frame number within this source, starting at 0
    pub index: u64,
    pub size_bytes: u32,
    pub emit_time: SimTime,
}

/// Counters kept per generator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GeneratorStats {
    pub frames: u64,
    pub bytes_generated: u64,
    pub segments_issued: u64,
    pub segments_deferred: u64,
    pub segments_failed: u64,
    pub bytes_failed: u64,
}

impl GeneratorStats {
    /// Mean generated frame size in bytes.
    pub fn mean_frame_bytes(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.bytes_generated as f64 / self.frames as f64
        }
    }
}

/// Frame generator for one direction.
pub struct VideoSource {
    sampler: FrameSizeSampler,
    interval: Duration,
    start: SimTime,
    stop: SimTime,
    next_index: u64,
    pending: Option<EventId>,
    stopped: bool,
    stats: GeneratorStats,
}

impl VideoSource {
    /// `interval` must be non-zero; the configuration layer guarantees it.
    pub fn new(sampler: FrameSizeSampler, interval: Duration, start: SimTime, stop: SimTime) -> Self {
        debug_assert!(!interval.is_zero());
        Self {
            sampler,
            interval,
            start,
            stop,
            next_index: 0,
            pending: None,
            stopped: false,
            stats: GeneratorStats::default(),
        }
    }

    /// Time of the next frame, or `None` once it would fall at or after stop.
    pub fn next_tick(&self) -> Option<SimTime> {
        if self.stopped {
            return None;
        }
        let offset = self.interval.checked_mul(u32::try_from(self.next_index).ok()?)?;
        let at = self.start + offset;
        (at < self.stop).then_some(at)
    }

    /// Schedule the next tick on `queue`, if there is one.
    pub fn schedule_next<E>(&mut self, queue: &mut EventQueue<E>, event: E) -> Option<SimTime> {
        let at = self.next_tick();
        self.pending = at.map(|at| queue.schedule(at, event));
        at
    }

    /// Produce the frame due at `now`.
    pub fn emit_frame(&mut self, now: SimTime) -> FrameJob {
        self.pending = None;
        let size_bytes = self.sampler.sample();
        let job = FrameJob {
            index: self.next_index,
            size_bytes,
            emit_time: now,
        };

        self.next_index += 1;
        self.stats.frames += 1;
        self.stats.bytes_generated += u64::from(size_bytes);
        debug!(index = job.index, size_bytes, %now, "frame generated");
        job
    }

    /// Fold one frame's dispatch result into the counters.
    pub fn record_dispatch(&mut self, outcome: &DispatchOutcome) {
        self.stats.segments_issued += u64::from(outcome.segments);
        self.stats.segments_deferred += u64::from(outcome.deferred);
        self.stats.segments_failed += u64::from(outcome.failed);
        self.stats.bytes_failed += outcome.failed_bytes;
    }

    /// Stop generating and cancel the pending tick.
    pub fn stop<E>(&mut self, queue: &mut EventQueue<E>) {
        self.stopped = true;
        if let Some(id) = self.pending.take() {
            queue.cancel(id);
        }
    }

    pub fn stats(&self) -> GeneratorStats {
        self.stats
    }
}

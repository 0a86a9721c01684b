//! Gamma-distributed spacing of segment sends within a frame.
//!
//! Without pacing a frame's segments go to the transport back-to-back. With
//! pacing each segment waits a Gamma-distributed gap after the previous one
//! (the first waits after the frame tick). Gaps at or above the frame
//! interval are redrawn, so a single gap never spans a whole frame.
//!
//! Segments from consecutive frames share one FIFO, so a frame that is still
//! being paced out when the next tick fires keeps its place in the stream.

use crate::error::ConfigError;
use crate::scheduler::{EventId, EventQueue};
use crate::time::SimTime;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Gamma};
use std::collections::VecDeque;
use std::time::Duration;

/// Gamma shape of the inter-segment gap.
pub const DEFAULT_GAMMA_SHAPE: f64 = 0.2463;

/// Gamma scale of the inter-segment gap.
pub const DEFAULT_GAMMA_SCALE: Duration = Duration::from_micros(60_227);

/// Upper bound on redraws before a gap is clamped to zero.
const MAX_REDRAWS: usize = 1000;

/// RNG stream used for gaps, apart from the frame-size stream.
const GAP_STREAM: u64 = 1;

/// Inter-segment gap settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JitterConfig {
    pub shape: f64,
    pub scale: Duration,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            shape: DEFAULT_GAMMA_SHAPE,
            scale: DEFAULT_GAMMA_SCALE,
        }
    }
}

/// Paces the segments of one direction.
pub struct SegmentPacer {
    gamma: Gamma<f64>,
    limit: Duration,
    rng: ChaCha8Rng,
    queued: VecDeque<u32>,
    pending: Option<EventId>,
}

impl SegmentPacer {
    /// `limit` is the frame interval; gaps are always shorter.
    ///
    /// # Errors
    /// `ConfigError::InvalidGamma` unless shape and scale are positive and finite.
    pub fn new(config: JitterConfig, limit: Duration, seed: u64) -> Result<Self, ConfigError> {
        let (shape, scale) = (config.shape, config.scale.as_secs_f64());
        let invalid = ConfigError::InvalidGamma { shape, scale };
        if !(shape.is_finite() && shape > 0.0 && scale > 0.0) {
            return Err(invalid);
        }
        let gamma = Gamma::new(shape, scale).map_err(|_| invalid)?;

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        rng.set_stream(GAP_STREAM);
        Ok(Self {
            gamma,
            limit,
            rng,
            queued: VecDeque::new(),
            pending: None,
        })
    }

    /// Draw one gap, strictly below the frame interval.
    pub fn gap(&mut self) -> Duration {
        for _ in 0..MAX_REDRAWS {
            if let Ok(gap) = Duration::try_from_secs_f64(self.gamma.sample(&mut self.rng)) {
                if gap < self.limit {
                    return gap;
                }
            }
        }
        Duration::ZERO
    }

    /// Append one frame's segments.
    pub fn push_frame(&mut self, segments: impl IntoIterator<Item = u32>) {
        self.queued.extend(segments);
    }

    /// Schedule the next paced send after a fresh gap, unless one is already
    /// pending or nothing is queued.
    pub fn schedule_next<E>(&mut self, queue: &mut EventQueue<E>, now: SimTime, event: E) -> Option<SimTime> {
        if self.pending.is_some() || self.queued.is_empty() {
            return None;
        }
        let at = now + self.gap();
        self.pending = Some(queue.schedule(at, event));
        Some(at)
    }

    /// Take the segment whose send is due.
    pub fn next_segment(&mut self) -> Option<u32> {
        self.pending = None;
        self.queued.pop_front()
    }

    /// Segments still waiting for their gap.
    pub fn queued(&self) -> usize {
        self.queued.len()
    }

    /// Cancel the pending send and drop the queued segments.
    ///
    /// Returns the number of bytes that were never handed to the transport.
    pub fn stop<E>(&mut self, queue: &mut EventQueue<E>) -> u64 {
        if let Some(id) = self.pending.take() {
            queue.cancel(id);
        }
        self.queued.drain(..).map(u64::from).sum()
    }
}

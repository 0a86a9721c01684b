//! Splits frames into transport sends.
//!
//! A frame larger than the maximum segment size becomes several sends of
//! exactly `max_segment_bytes`, followed by one shorter send for the
//! remainder. The bytes across all segments always add up to the frame size.
//!
//! [`Segmenter::dispatch`] issues a frame's sends back-to-back; with jitter
//! enabled the simulation spaces them out and issues each one through
//! [`Segmenter::dispatch_segment`]. Buffer backpressure belongs to the
//! transport behind [`SegmentSink`]; the segmenter never retries.

use super::source::FrameJob;
use crate::error::{ConfigError, TransportError};
use crate::transport::{SendStatus, StreamSocket};

/// Anything that accepts transport sends.
pub trait SegmentSink {
    fn send_segment(&mut self, bytes: u32) -> Result<SendStatus, TransportError>;
}

impl SegmentSink for StreamSocket {
    fn send_segment(&mut self, bytes: u32) -> Result<SendStatus, TransportError> {
        self.send(bytes)
    }
}

/// Iterator over segment sizes for one frame.
#[derive(Debug, Clone)]
pub struct SegmentSizes {
    remaining: u32,
    max: u32,
}

impl Iterator for SegmentSizes {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        if self.remaining == 0 {
            return None;
        }
        let size = self.remaining.min(self.max);
        self.remaining -= size;
        Some(size)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining.div_ceil(self.max) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for SegmentSizes {}

/// What happened to one frame's sends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Segments the transport took (queued or deferred)
    pub segments: u32,

    /// Bytes the transport took
    pub bytes: u64,

    /// Segments the transport deferred for lack of buffer space
    pub deferred: u32,

    /// Segments lost to a terminal transport error
    pub failed: u32,

    pub failed_bytes: u64,

    /// The terminal error, if any
    pub error: Option<TransportError>,
}

/// Frame-to-segment splitter.
#[derive(Debug, Clone, Copy)]
pub struct Segmenter {
    max_segment_bytes: u32,
}

impl Segmenter {
    /// # Errors
    /// `ConfigError::Zero` if `max_segment_bytes` is zero.
    pub fn new(max_segment_bytes: u32) -> Result<Self, ConfigError> {
        if max_segment_bytes == 0 {
            return Err(ConfigError::Zero("maximum segment size"));
        }
        Ok(Self { max_segment_bytes })
    }

    /// Segment sizes for a frame of `frame_bytes`.
    pub fn segments(&self, frame_bytes: u32) -> SegmentSizes {
        SegmentSizes {
            remaining: frame_bytes,
            max: self.max_segment_bytes,
        }
    }

    /// Issue every segment of `job` through `sink`.
    ///
    /// A terminal transport error stops the frame; the segments that were not
    /// taken are reported as failed.
    pub fn dispatch<S: SegmentSink>(&self, job: &FrameJob, sink: &mut S) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        let mut segments = self.segments(job.size_bytes);

        while let Some(size) = segments.next() {
            if let Err(e) = issue(size, sink, &mut outcome) {
                outcome.failed = 1 + segments.len() as u32;
                outcome.failed_bytes = u64::from(size) + segments.by_ref().map(u64::from).sum::<u64>();
                outcome.error = Some(e);
                break;
            }
        }

        outcome
    }

    /// Issue a single paced segment of `bytes`.
    pub fn dispatch_segment<S: SegmentSink>(&self, bytes: u32, sink: &mut S) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();
        if let Err(e) = issue(bytes, sink, &mut outcome) {
            outcome.failed = 1;
            outcome.failed_bytes = u64::from(bytes);
            outcome.error = Some(e);
        }
        outcome
    }
}

fn issue<S: SegmentSink>(size: u32, sink: &mut S, outcome: &mut DispatchOutcome) -> Result<(), TransportError> {
    let status = sink.send_segment(size)?;
    outcome.segments += 1;
    outcome.bytes += u64::from(size);
    if status == SendStatus::Deferred {
        outcome.deferred += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::SimTime;

    /// Records sends; fails after `fail_after` accepted segments.
    #[derive(Default)]
    struct RecordingSink {
        sent: Vec<u32>,
        fail_after: Option<usize>,
        defer_every: Option<usize>,
    }

    impl SegmentSink for RecordingSink {
        fn send_segment(&mut self, bytes: u32) -> Result<SendStatus, TransportError> {
            if self.fail_after == Some(self.sent.len()) {
                return Err(TransportError::ConnectionClosed);
            }
            self.sent.push(bytes);
            match self.defer_every {
                Some(n) if self.sent.len() % n == 0 => Ok(SendStatus::Deferred),
                _ => Ok(SendStatus::Queued),
            }
        }
    }

    fn job(size_bytes: u32) -> FrameJob {
        FrameJob {
            index: 0,
            size_bytes,
            emit_time: SimTime::ZERO,
        }
    }

    #[test]
    fn test_exact_accounting() {
        let max = 1472;
        let segmenter = Segmenter::new(max).unwrap();

        for size in [0u32, 1, 1471, 1472, 1473, 2944, 7808, 100_000, 1_499_999] {
            let sizes: Vec<u32> = segmenter.segments(size).collect();
            assert_eq!(sizes.iter().map(|&s| u64::from(s)).sum::<u64>(), u64::from(size));
            assert_eq!(sizes.len(), size.div_ceil(max) as usize, "frame of {size} bytes");
            assert!(sizes.iter().all(|&s| s > 0 && s <= max));
        }
    }

    #[test]
    fn test_only_last_segment_is_short() {
        let segmenter = Segmenter::new(1000).unwrap();
        let sizes: Vec<u32> = segmenter.segments(3500).collect();
        assert_eq!(sizes, vec![1000, 1000, 1000, 500]);
    }

    #[test]
    fn test_size_hint_is_exact() {
        let segmenter = Segmenter::new(100).unwrap();
        let mut it = segmenter.segments(250);
        assert_eq!(it.len(), 3);
        it.next();
        assert_eq!(it.len(), 2);
    }

    #[test]
    fn test_zero_max_segment_rejected() {
        assert_eq!(Segmenter::new(0).err(), Some(ConfigError::Zero("maximum segment size")));
    }

    #[test]
    fn test_dispatch_sends_everything() {
        let segmenter = Segmenter::new(1472).unwrap();
        let mut sink = RecordingSink {
            defer_every: Some(2),
            ..RecordingSink::default()
        };

        let outcome = segmenter.dispatch(&job(5000), &mut sink);

        assert_eq!(sink.sent, vec![1472, 1472, 1472, 584]);
        assert_eq!(outcome.segments, 4);
        assert_eq!(outcome.bytes, 5000);
        assert_eq!(outcome.deferred, 2);
        assert_eq!(outcome.failed, 0);
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_dispatch_counts_failed_segments() {
        let segmenter = Segmenter::new(1000).unwrap();
        let mut sink = RecordingSink {
            fail_after: Some(1),
            ..RecordingSink::default()
        };

        let outcome = segmenter.dispatch(&job(3500), &mut sink);

        assert_eq!(outcome.segments, 1);
        assert_eq!(outcome.bytes, 1000);
        assert_eq!(outcome.failed, 3);
        assert_eq!(outcome.failed_bytes, 2500);
        assert_eq!(outcome.error, Some(TransportError::ConnectionClosed));
    }

    #[test]
    fn test_dispatch_single_segment() {
        let segmenter = Segmenter::new(1000).unwrap();
        let mut sink = RecordingSink {
            fail_after: Some(1),
            ..RecordingSink::default()
        };

        let ok = segmenter.dispatch_segment(700, &mut sink);
        assert_eq!((ok.segments, ok.bytes, ok.failed), (1, 700, 0));

        let failed = segmenter.dispatch_segment(300, &mut sink);
        assert_eq!((failed.segments, failed.failed, failed.failed_bytes), (0, 1, 300));
        assert_eq!(failed.error, Some(TransportError::ConnectionClosed));
        assert_eq!(sink.sent, vec![700]);
    }

    #[test]
    fn test_dispatch_empty_frame() {
        let segmenter = Segmenter::new(1000).unwrap();
        let mut sink = RecordingSink::default();

        let outcome = segmenter.dispatch(&job(0), &mut sink);
        assert_eq!(outcome, DispatchOutcome::default());
        assert!(sink.sent.is_empty());
    }
}

//! Synthetic video traffic: frame sizes, frame pacing, segmentation and
//! optional jitter between segment sends.

pub mod pacer;
pub mod sampler;
pub mod segmenter;
pub mod source;

pub use pacer::{JitterConfig, SegmentPacer};
pub use sampler::{FrameSizeSampler, VideoQuality};
pub use segmenter::{DispatchOutcome, SegmentSink, Segmenter};
pub use source::{FrameJob, GeneratorStats, VideoSource};

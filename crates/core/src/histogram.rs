//! Fixed-width histogram over non-negative durations.
//!
//! Bins are contiguous and cover `[0, +inf)`: bin `i` spans
//! `[i * width, (i + 1) * width)` and the last bin also absorbs everything
//! beyond the configured range. The layout is fixed at construction.
//!
//! Binning is done on integer nanoseconds, so a value sitting exactly on an
//! edge always lands in the bin that starts there.

use crate::error::HistogramError;
use serde::Serialize;
use std::time::Duration;

/// One bin as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bin {
    pub start: Duration,
    /// `None` for the terminal bin
    pub end: Option<Duration>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Histogram {
    bin_width: Duration,
    counts: Vec<u64>,
}

impl Histogram {
    /// # Errors
    /// - `HistogramError::ZeroBinWidth` if `bin_width` is zero
    /// - `HistogramError::NoBins` if `bin_count` is zero
    pub fn new(bin_width: Duration, bin_count: usize) -> Result<Self, HistogramError> {
        if bin_width.is_zero() {
            return Err(HistogramError::ZeroBinWidth);
        }
        if bin_count == 0 {
            return Err(HistogramError::NoBins);
        }
        Ok(Self {
            bin_width,
            counts: vec![0; bin_count],
        })
    }

    /// Deposit one value.
    pub fn add(&mut self, value: Duration) {
        let index = self.index_of(value);
        self.counts[index] += 1;
    }

    /// Index of the bin that holds `value`.
    pub fn index_of(&self, value: Duration) -> usize {
        let last = self.counts.len() - 1;
        let raw = value.as_nanos() / self.bin_width.as_nanos();
        usize::try_from(raw).map_or(last, |i| i.min(last))
    }

    pub fn bin_width(&self) -> Duration {
        self.bin_width
    }

    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    pub fn bin_start(&self, index: usize) -> Duration {
        self.edge(index)
    }

    /// `None` for the terminal bin.
    pub fn bin_end(&self, index: usize) -> Option<Duration> {
        if index + 1 >= self.counts.len() {
            None
        } else {
            Some(self.edge(index + 1))
        }
    }

    fn edge(&self, index: usize) -> Duration {
        u32::try_from(index)
            .ok()
            .and_then(|i| self.bin_width.checked_mul(i))
            .unwrap_or(Duration::MAX)
    }

    pub fn count(&self, index: usize) -> u64 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    /// Sum of all bin counts.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Number of bins up to and including the last non-empty one.
    pub fn used_bins(&self) -> usize {
        self.counts.iter().rposition(|&c| c > 0).map_or(0, |i| i + 1)
    }

    /// All bins in order.
    pub fn bins(&self) -> impl Iterator<Item = Bin> + '_ {
        (0..self.counts.len()).map(|i| Bin {
            start: self.bin_start(i),
            end: self.bin_end(i),
            count: self.counts[i],
        })
    }
}

//! Error types for the video simulation harness.
//!
//! Configuration problems are caught before the simulation starts; transport
//! and histogram errors surface while it runs. Nothing here panics.

use thiserror::Error;

/// Top-level error type for all operations in the system.
///
/// Each variant corresponds to a specific failure domain:
/// - Config: invalid preset, non-positive durations, malformed sizes
/// - Transport: terminal send failures from the stream socket
/// - Histogram: invalid bin layout
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration rejected before the run started
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport reported a terminal failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Histogram could not be constructed
    #[error("histogram error: {0}")]
    Histogram(#[from] HistogramError),
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// Video quality preset outside 1..=6
    #[error("video quality {0} is invalid, expected 1 through 6")]
    InvalidQuality(u8),

    /// A duration that must be strictly positive was not
    #[error("{name} must be a positive number of seconds, got {value}")]
    NonPositiveDuration { name: &'static str, value: f64 },

    /// Link delay was negative or not finite
    #[error("link delay must be a non-negative number of milliseconds, got {0}")]
    InvalidLinkDelay(f64),

    /// Weibull parameters must both be strictly positive
    #[error("weibull parameters must be positive: scale {scale}, shape {shape}")]
    InvalidWeibull { scale: f64, shape: f64 },

    /// Gamma parameters of the inter-segment gap must both be positive
    #[error("gamma parameters must be positive: shape {shape}, scale {scale} s")]
    InvalidGamma { shape: f64, scale: f64 },

    /// A size or count that must be non-zero was zero
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Transport errors.
///
/// A full send buffer is not an error: the socket defers the segment and
/// admits it later, up to a bounded backlog. Everything else is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Segment can never fit in the send buffer
    #[error("segment of {size} bytes exceeds send buffer capacity {capacity}")]
    SegmentTooLarge { size: u32, capacity: u32 },

    /// Send buffer and deferral backlog are both full
    #[error("send backlog full: {backlog} bytes waiting, segment of {size} bytes refused")]
    BacklogFull { size: u32, backlog: u64 },

    /// Socket was closed when the simulation stopped
    #[error("connection closed")]
    ConnectionClosed,
}

/// Histogram construction errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HistogramError {
    /// Bin width must be non-zero
    #[error("histogram bin width must be non-zero")]
    ZeroBinWidth,

    /// At least one bin is needed to cover [0, +inf)
    #[error("histogram needs at least one bin")]
    NoBins,
}

/// Type alias for Result with our Error type
pub type Result<T> = std::result::Result<T, Error>;

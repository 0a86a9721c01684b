//! Simulation configuration.
//!
//! `ConfigBuilder` takes raw values (seconds, milliseconds, a preset number)
//! and `build()` validates all of them at once, producing a typed
//! `SimulationConfig`. Nothing is validated later: a built configuration is
//! always runnable.
//!
//! # Defaults
//!
//! A 30 s run over a 100 Mbps link with 10 ms delay, downlink video only,
//! quality `bv1` at 30 frames per second, TCP transport, segments sent
//! back-to-back (no intra-frame jitter).

use crate::error::ConfigError;
use crate::link::LinkConfig;
use crate::monitor::MonitorConfig;
use crate::packet::Protocol;
use crate::traffic::sampler::DEFAULT_MAX_FRAME_BYTES;
use crate::traffic::pacer::{DEFAULT_GAMMA_SCALE, DEFAULT_GAMMA_SHAPE};
use crate::traffic::{JitterConfig, VideoQuality};
use crate::transport::TransportConfig;
use std::fmt;
use std::time::Duration;

/// Largest application send, sized to fit one 1500-byte UDP datagram.
pub const DEFAULT_MAX_SEGMENT_BYTES: u32 = 1472;

/// Complete, validated configuration for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Total run length
    pub duration: Duration,

    pub link: LinkConfig,

    /// Client-to-server video enabled
    pub uplink: bool,

    /// Server-to-client video enabled
    pub downlink: bool,

    /// Trace every packet event to the capture log target
    pub capture: bool,

    pub quality: VideoQuality,
    pub frame_interval: Duration,

    /// Largest single send issued by the segmenter
    pub max_segment_bytes: u32,

    /// Frame size draws at or above this are redrawn
    pub max_frame_bytes: u32,

    /// Gamma spacing between a frame's segment sends, if enabled
    pub jitter: Option<JitterConfig>,

    pub transport: TransportConfig,
    pub monitor: MonitorConfig,

    /// Seed for all randomness in the run
    pub seed: u64,
}

impl SimulationConfig {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

impl fmt::Display for SimulationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Configuration ===")?;
        writeln!(f, "Duration: {:.3} s", self.duration.as_secs_f64())?;
        writeln!(f, "Seed: {}", self.seed)?;
        writeln!(f)?;
        writeln!(f, "=== Link ===")?;
        writeln!(f, "Data rate: {} bps", self.link.data_rate_bps)?;
        writeln!(f, "Delay: {:.3} ms", self.link.delay.as_secs_f64() * 1000.0)?;
        writeln!(f, "Device queue: {} packets", self.link.queue_capacity)?;
        writeln!(f)?;
        writeln!(f, "=== Video ===")?;
        writeln!(f, "Uplink: {}", self.uplink)?;
        writeln!(f, "Downlink: {}", self.downlink)?;
        writeln!(
            f,
            "Quality: {} (scale {}, shape {})",
            self.quality,
            self.quality.scale(),
            self.quality.shape()
        )?;
        writeln!(f, "Frame interval: {:.4} s", self.frame_interval.as_secs_f64())?;
        writeln!(f, "Max segment: {} bytes", self.max_segment_bytes)?;
        match &self.jitter {
            Some(j) => writeln!(
                f,
                "Jitter: gamma shape {}, scale {:.3} ms",
                j.shape,
                j.scale.as_secs_f64() * 1000.0
            )?,
            None => writeln!(f, "Jitter: off")?,
        }
        writeln!(f)?;
        writeln!(f, "=== Transport ===")?;
        writeln!(f, "Protocol: {}", self.transport.protocol)?;
        writeln!(f, "MSS: {} bytes", self.transport.mss)?;
        writeln!(f, "Send buffer: {} bytes", self.transport.send_buffer_bytes)?;
        writeln!(f, "Backlog limit: {} bytes", self.transport.max_backlog_bytes)?;
        writeln!(f, "Capture: {}", self.capture)?;
        Ok(())
    }
}

/// Raw, unvalidated configuration values.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    duration_secs: f64,
    link_delay_ms: f64,
    link_rate_bps: u64,
    link_queue_packets: usize,
    uplink: bool,
    downlink: bool,
    capture: bool,
    quality: u8,
    frame_interval_secs: f64,
    max_segment_bytes: u32,
    max_frame_bytes: u32,
    has_jitter: bool,
    gamma_shape: f64,
    gamma_scale_ms: f64,
    protocol: Protocol,
    mss: u32,
    send_buffer_bytes: u32,
    max_backlog_bytes: u64,
    ack_every: u32,
    delay_bin_width_secs: f64,
    jitter_bin_width_secs: f64,
    bin_count: usize,
    seed: u64,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        let link = LinkConfig::default();
        let transport = TransportConfig::default();
        let monitor = MonitorConfig::default();
        Self {
            duration_secs: 30.0,
            link_delay_ms: 10.0,
            link_rate_bps: link.data_rate_bps,
            link_queue_packets: link.queue_capacity,
            uplink: false,
            downlink: true,
            capture: false,
            quality: 1,
            frame_interval_secs: 0.0333,
            max_segment_bytes: DEFAULT_MAX_SEGMENT_BYTES,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            has_jitter: false,
            gamma_shape: DEFAULT_GAMMA_SHAPE,
            gamma_scale_ms: DEFAULT_GAMMA_SCALE.as_secs_f64() * 1000.0,
            protocol: transport.protocol,
            mss: transport.mss,
            send_buffer_bytes: transport.send_buffer_bytes,
            max_backlog_bytes: transport.max_backlog_bytes,
            ack_every: transport.ack_every,
            delay_bin_width_secs: monitor.delay_bin_width.as_secs_f64(),
            jitter_bin_width_secs: monitor.jitter_bin_width.as_secs_f64(),
            bin_count: monitor.bin_count,
            seed: 1,
        }
    }
}

impl ConfigBuilder {
    pub fn duration_secs(mut self, secs: f64) -> Self {
        self.duration_secs = secs;
        self
    }

    pub fn link_delay_ms(mut self, ms: f64) -> Self {
        self.link_delay_ms = ms;
        self
    }

    pub fn link_rate_bps(mut self, bps: u64) -> Self {
        self.link_rate_bps = bps;
        self
    }

    pub fn uplink(mut self, enabled: bool) -> Self {
        self.uplink = enabled;
        self
    }

    pub fn downlink(mut self, enabled: bool) -> Self {
        self.downlink = enabled;
        self
    }

    pub fn capture(mut self, enabled: bool) -> Self {
        self.capture = enabled;
        self
    }

    pub fn quality(mut self, preset: u8) -> Self {
        self.quality = preset;
        self
    }

    pub fn frame_interval_secs(mut self, secs: f64) -> Self {
        self.frame_interval_secs = secs;
        self
    }

    pub fn max_segment_bytes(mut self, bytes: u32) -> Self {
        self.max_segment_bytes = bytes;
        self
    }

    pub fn max_frame_bytes(mut self, bytes: u32) -> Self {
        self.max_frame_bytes = bytes;
        self
    }

    /// Space a frame's segment sends by Gamma-distributed gaps.
    pub fn has_jitter(mut self, enabled: bool) -> Self {
        self.has_jitter = enabled;
        self
    }

    pub fn gamma_shape(mut self, shape: f64) -> Self {
        self.gamma_shape = shape;
        self
    }

    pub fn gamma_scale_ms(mut self, ms: f64) -> Self {
        self.gamma_scale_ms = ms;
        self
    }

    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn mss(mut self, bytes: u32) -> Self {
        self.mss = bytes;
        self
    }

    pub fn send_buffer_bytes(mut self, bytes: u32) -> Self {
        self.send_buffer_bytes = bytes;
        self
    }

    pub fn max_backlog_bytes(mut self, bytes: u64) -> Self {
        self.max_backlog_bytes = bytes;
        self
    }

    pub fn ack_every(mut self, packets: u32) -> Self {
        self.ack_every = packets;
        self
    }

    pub fn delay_bin_width_secs(mut self, secs: f64) -> Self {
        self.delay_bin_width_secs = secs;
        self
    }

    pub fn jitter_bin_width_secs(mut self, secs: f64) -> Self {
        self.jitter_bin_width_secs = secs;
        self
    }

    pub fn bin_count(mut self, bins: usize) -> Self {
        self.bin_count = bins;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validate every field and produce a runnable configuration.
    ///
    /// # Errors
    /// The first invalid field found, as a `ConfigError`.
    pub fn build(self) -> Result<SimulationConfig, ConfigError> {
        let quality = VideoQuality::try_from(self.quality)?;
        let duration = positive_duration("simulation duration", self.duration_secs)?;
        let frame_interval = positive_duration("frame interval", self.frame_interval_secs)?;

        let delay = Duration::try_from_secs_f64(self.link_delay_ms / 1000.0)
            .map_err(|_| ConfigError::InvalidLinkDelay(self.link_delay_ms))?;

        let delay_bin_width = positive_duration("delay bin width", self.delay_bin_width_secs)?;
        let jitter_bin_width = positive_duration("jitter bin width", self.jitter_bin_width_secs)?;

        let jitter = if self.has_jitter {
            let invalid = ConfigError::InvalidGamma {
                shape: self.gamma_shape,
                scale: self.gamma_scale_ms / 1000.0,
            };
            if !(self.gamma_shape.is_finite() && self.gamma_shape > 0.0) {
                return Err(invalid);
            }
            match Duration::try_from_secs_f64(self.gamma_scale_ms / 1000.0) {
                Ok(scale) if !scale.is_zero() => Some(JitterConfig {
                    shape: self.gamma_shape,
                    scale,
                }),
                _ => return Err(invalid),
            }
        } else {
            None
        };

        nonzero("link data rate", self.link_rate_bps)?;
        nonzero("link queue capacity", self.link_queue_packets as u64)?;
        nonzero("maximum segment size", u64::from(self.max_segment_bytes))?;
        nonzero("maximum frame size", u64::from(self.max_frame_bytes))?;
        nonzero("transport MSS", u64::from(self.mss))?;
        nonzero("send buffer size", u64::from(self.send_buffer_bytes))?;
        nonzero("ACK frequency", u64::from(self.ack_every))?;
        nonzero("histogram bin count", self.bin_count as u64)?;

        Ok(SimulationConfig {
            duration,
            link: LinkConfig {
                data_rate_bps: self.link_rate_bps,
                delay,
                queue_capacity: self.link_queue_packets,
            },
            uplink: self.uplink,
            downlink: self.downlink,
            capture: self.capture,
            quality,
            frame_interval,
            max_segment_bytes: self.max_segment_bytes,
            max_frame_bytes: self.max_frame_bytes,
            jitter,
            transport: TransportConfig {
                protocol: self.protocol,
                mss: self.mss,
                send_buffer_bytes: self.send_buffer_bytes,
                ack_every: self.ack_every,
                max_backlog_bytes: self.max_backlog_bytes,
            },
            monitor: MonitorConfig {
                delay_bin_width,
                jitter_bin_width,
                bin_count: self.bin_count,
                ..MonitorConfig::default()
            },
            seed: self.seed,
        })
    }
}

fn positive_duration(name: &'static str, secs: f64) -> Result<Duration, ConfigError> {
    let err = ConfigError::NonPositiveDuration { name, value: secs };
    if !(secs.is_finite() && secs > 0.0) {
        return Err(err);
    }
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(err),
    }
}

fn nonzero(name: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Zero(name));
    }
    Ok(())
}

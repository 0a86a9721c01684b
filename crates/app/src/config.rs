//! Command-line configuration for the vidsim binary.
//!
//! Every option has a default, so the tool runs with ZERO arguments: a 30 s
//! downlink-only run at quality bv1. Raw values are handed to the core
//! `ConfigBuilder`, which does all validation.

use clap::{ArgAction, Parser, ValueEnum};
use tracing::Level;
use vidsim_core::packet::Protocol;
use vidsim_core::traffic::pacer::DEFAULT_GAMMA_SHAPE;
use vidsim_core::ConfigBuilder;

/// Transport used by both video directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    Tcp,
    Udp,
}

impl From<TransportArg> for Protocol {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::Tcp => Protocol::Tcp,
            TransportArg::Udp => Protocol::Udp,
        }
    }
}

/// Video traffic over a point-to-point link, with per-flow delay and jitter histograms.
#[derive(Debug, Parser)]
#[command(name = "vidsim", version)]
pub struct Args {
    /// Simulation time in seconds
    #[arg(long, default_value_t = 30.0)]
    pub sim_time_sec: f64,

    /// Uplink video from the client to the server
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub enable_video_uplink: bool,

    /// Downlink video from the server to the client
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub enable_video_downlink: bool,

    /// Trace every packet on the link under the `vidsim::capture` log target
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub enable_capture: bool,

    /// One-way delay of the link in milliseconds
    #[arg(long, default_value_t = 10.0)]
    pub p2p_link_delay_ms: f64,

    /// Link data rate in bits per second
    #[arg(long, default_value_t = 100_000_000)]
    pub p2p_link_rate_bps: u64,

    /// Video quality preset, 1 through 6 for bv1 through bv6
    #[arg(long, default_value_t = 1)]
    pub video_quality: u8,

    /// Frame interval in seconds; 0.0333 for 30 fps
    #[arg(long, default_value_t = 0.0333)]
    pub video_frame_interval_s: f64,

    /// Space the segments of a frame by Gamma-distributed gaps
    #[arg(long, default_value_t = false, action = ArgAction::Set)]
    pub video_has_jitter: bool,

    /// Gamma shape of the gap between segment sends
    #[arg(long, default_value_t = DEFAULT_GAMMA_SHAPE)]
    pub video_gamma_shape: f64,

    /// Gamma scale of the gap between segment sends, in milliseconds
    #[arg(long, default_value_t = 60.227)]
    pub video_gamma_scale_ms: f64,

    /// Transport protocol for the video flows
    #[arg(long, value_enum, default_value_t = TransportArg::Tcp)]
    pub transport: TransportArg,

    /// Seed for frame-size sampling
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// The log level for traces. opts: (error, warn, info, debug, trace)
    #[arg(long, default_value_t = Level::WARN)]
    pub log_level: Level,

    /// Print the resolved configuration before running
    #[arg(long)]
    pub print_config: bool,

    /// Emit the report as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

impl Args {
    /// Core configuration builder carrying these options.
    pub fn to_builder(&self) -> ConfigBuilder {
        ConfigBuilder::default()
            .duration_secs(self.sim_time_sec)
            .uplink(self.enable_video_uplink)
            .downlink(self.enable_video_downlink)
            .capture(self.enable_capture)
            .link_delay_ms(self.p2p_link_delay_ms)
            .link_rate_bps(self.p2p_link_rate_bps)
            .quality(self.video_quality)
            .frame_interval_secs(self.video_frame_interval_s)
            .has_jitter(self.video_has_jitter)
            .gamma_shape(self.video_gamma_shape)
            .gamma_scale_ms(self.video_gamma_scale_ms)
            .protocol(self.transport.into())
            .seed(self.seed)
    }
}

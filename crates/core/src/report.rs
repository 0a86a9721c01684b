//! End-of-run report.
//!
//! Rendering is pure formatting over a drained [`FlowSnapshot`] and the
//! run's counters; every number printed here was computed elsewhere.
//!
//! Flows are listed in first-observation order. Each flow prints its
//! counters, offered load and throughput, then the delay and jitter
//! histograms as `(bin start, bin end, count)` tables. Tables stop at the
//! last non-empty bin, and the open-ended terminal bin prints its end as
//! `inf`.

use crate::config::SimulationConfig;
use crate::histogram::Histogram;
use crate::link::Direction;
use crate::monitor::{FlowEntry, FlowSnapshot};
use crate::packet::Protocol;
use crate::traffic::{GeneratorStats, VideoQuality};
use crate::transport::SocketStats;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

const SEPARATOR: &str = "-----------------";

/// Run parameters echoed in the report header.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunParameters {
    pub duration: Duration,
    pub quality: VideoQuality,
    pub scale: f64,
    pub shape: f64,
    pub frame_interval: Duration,
    pub protocol: Protocol,
    pub link_rate_bps: u64,
    pub link_delay: Duration,
    pub uplink: bool,
    pub downlink: bool,
    pub has_jitter: bool,
    pub seed: u64,
}

impl From<&SimulationConfig> for RunParameters {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            duration: config.duration,
            quality: config.quality,
            scale: config.quality.scale(),
            shape: config.quality.shape(),
            frame_interval: config.frame_interval,
            protocol: config.transport.protocol,
            link_rate_bps: config.link.data_rate_bps,
            link_delay: config.link.delay,
            uplink: config.uplink,
            downlink: config.downlink,
            has_jitter: config.jitter.is_some(),
            seed: config.seed,
        }
    }
}

/// Counters of one video generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeneratorReport {
    pub direction: Direction,
    pub stats: GeneratorStats,
    pub socket: SocketStats,
}

/// Counters that do not belong to any one flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Diagnostics {
    /// Receives with no matching send record
    pub unattributed: u64,

    /// Acknowledgments dropped at a full device queue
    pub ack_drops: u64,

    /// Pending events discarded at stop
    pub discarded_events: u64,

    /// Packet events logged by the capture tap
    pub captured_events: u64,
}

/// Everything printed at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub parameters: RunParameters,
    pub flows: FlowSnapshot,
    pub generators: Vec<GeneratorReport>,
    pub diagnostics: Diagnostics,
}

impl Report {
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.parameters;
        writeln!(f, "=== Video traffic report ===")?;
        writeln!(
            f,
            "Duration: {:.3} s | Quality: {} (scale {}, shape {}) | Frame interval: {} s | Jitter: {}",
            p.duration.as_secs_f64(),
            p.quality,
            p.scale,
            p.shape,
            p.frame_interval.as_secs_f64(),
            on_off(p.has_jitter)
        )?;
        writeln!(
            f,
            "Link: {}, {:.3} ms | Transport: {} | Uplink: {} | Downlink: {} | Seed: {}",
            format_bit_rate(p.link_rate_bps as f64),
            p.link_delay.as_secs_f64() * 1000.0,
            p.protocol,
            on_off(p.uplink),
            on_off(p.downlink),
            p.seed
        )?;
        if p.protocol == Protocol::Tcp {
            writeln!(
                f,
                "Note: TCP acknowledgments use the reverse 5-tuple and are listed as separate flows."
            )?;
        }
        writeln!(f)?;

        write!(f, "{}", FlowTable::new(&self.flows, p.duration))?;

        writeln!(f, "=== Generators ===")?;
        if self.generators.is_empty() {
            writeln!(f, "(none enabled)")?;
        }
        for g in &self.generators {
            let s = &g.stats;
            writeln!(
                f,
                "{}: frames {}, bytes {}, mean frame {:.1} bytes, segments {}, deferred {}, failed {} ({} bytes)",
                g.direction,
                s.frames,
                s.bytes_generated,
                s.mean_frame_bytes(),
                s.segments_issued,
                s.segments_deferred,
                s.segments_failed,
                s.bytes_failed
            )?;
            writeln!(
                f,
                "  socket: accepted {} ({} bytes), deferred {}, refused {}, packets {}",
                g.socket.sends_accepted,
                g.socket.bytes_accepted,
                g.socket.sends_deferred,
                g.socket.sends_refused,
                g.socket.packets_emitted
            )?;
        }
        writeln!(f)?;

        let d = &self.diagnostics;
        writeln!(f, "=== Diagnostics ===")?;
        writeln!(
            f,
            "Unattributed samples: {} | ACK drops: {} | In flight at end: {} | Discarded events: {} | Captured events: {}",
            d.unattributed, d.ack_drops, self.flows.in_flight, d.discarded_events, d.captured_events
        )?;
        Ok(())
    }
}

/// Per-flow section of the report.
pub struct FlowTable<'a> {
    snapshot: &'a FlowSnapshot,
    duration: Duration,
}

impl<'a> FlowTable<'a> {
    /// `duration` is the divisor for offered load and throughput.
    pub fn new(snapshot: &'a FlowSnapshot, duration: Duration) -> Self {
        Self { snapshot, duration }
    }

    fn write_flow(&self, f: &mut fmt::Formatter<'_>, flow: &FlowEntry) -> fmt::Result {
        let key = &flow.key;
        let r = &flow.record;
        let secs = self.duration.as_secs_f64();

        writeln!(f, "Flow {} ({} -> {})", flow.id, key.source, key.destination)?;
        writeln!(
            f,
            "  Protocol:   {} {} -> {}",
            key.protocol, key.source_port, key.destination_port
        )?;
        writeln!(f, "  Tx Packets: {}", r.tx_packets)?;
        writeln!(f, "  Tx Bytes:   {}", r.tx_bytes)?;
        writeln!(f, "  TxOffered:  {}", format_bit_rate(bits_per_second(r.tx_bytes, secs)))?;
        writeln!(f, "  Rx Packets: {}", r.rx_packets)?;
        writeln!(f, "  Rx Bytes:   {}", r.rx_bytes)?;
        writeln!(f, "  Throughput: {}", format_bit_rate(bits_per_second(r.rx_bytes, secs)))?;
        writeln!(f, "  Lost Packets: {}", r.lost_packets)?;
        writeln!(f, "  Mean Delay:  {}", format_millis(r.mean_delay()))?;
        writeln!(f, "  Mean Jitter: {}", format_millis(r.mean_jitter()))?;
        if r.unattributed_packets > 0 {
            writeln!(f, "  Unattributed: {}", r.unattributed_packets)?;
        }

        writeln!(f, "Delay Histogram")?;
        write_histogram(f, &r.delay_histogram)?;
        writeln!(f, "Jitter Histogram")?;
        write_histogram(f, &r.jitter_histogram)
    }
}

impl fmt::Display for FlowTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.snapshot.flows.is_empty() {
            writeln!(f, "No flows observed.")?;
            writeln!(f)?;
        }
        for flow in &self.snapshot.flows {
            self.write_flow(f, flow)?;
        }
        Ok(())
    }
}

fn write_histogram(f: &mut fmt::Formatter<'_>, histogram: &Histogram) -> fmt::Result {
    writeln!(f, "{:<15} |\t{:<15} |\t{:<15}", "Bin Start (s)", "Bin End (s)", "Packet Count")?;
    let shown = histogram.used_bins().max(1);
    for bin in histogram.bins().take(shown) {
        writeln!(
            f,
            "{:<15} |\t{:<15} |\t{:<15}",
            format_seconds(bin.start),
            bin.end.map_or_else(|| "inf".to_string(), format_seconds),
            bin.count
        )?;
    }
    writeln!(f, "{SEPARATOR}")?;
    writeln!(f)
}

fn bits_per_second(bytes: u64, secs: f64) -> f64 {
    if secs > 0.0 {
        bytes as f64 * 8.0 / secs
    } else {
        0.0
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Format a rate in bits per second with an SI prefix, e.g. `1.852 Mbps`.
pub fn format_bit_rate(bps: f64) -> String {
    const UNITS: [&str; 5] = ["bps", "kbps", "Mbps", "Gbps", "Tbps"];
    let mut value = bps;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    format!("{value:.3} {}", UNITS[unit])
}

/// Bin edge in seconds, printed exactly from its nanosecond count.
fn format_seconds(edge: Duration) -> String {
    let nanos = edge.subsec_nanos();
    if nanos == 0 {
        return edge.as_secs().to_string();
    }
    let fraction = format!("{nanos:09}");
    format!("{}.{}", edge.as_secs(), fraction.trim_end_matches('0'))
}

fn format_millis(value: Option<Duration>) -> String {
    match value {
        Some(d) => format!("{:.3} ms", d.as_secs_f64() * 1000.0),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{Classify, Ipv4FlowClassifier};
    use crate::monitor::{FlowMonitor, MonitorConfig};
    use crate::packet::PacketHeader;
    use crate::time::SimTime;
    use std::net::Ipv4Addr;

    fn header() -> PacketHeader {
        PacketHeader {
            source: Ipv4Addr::new(10, 1, 1, 1),
            destination: Ipv4Addr::new(10, 1, 1, 2),
            source_port: 49153,
            destination_port: 60000,
            protocol: Protocol::Tcp,
        }
    }

    fn ms(n: u64) -> SimTime {
        SimTime::from_nanos(n * 1_000_000)
    }

    fn row(start: &str, end: &str, count: u64) -> String {
        format!("{:<15} |\t{:<15} |\t{:<15}\n", start, end, count)
    }

    fn report(flows: FlowSnapshot) -> Report {
        let config = SimulationConfig::builder().build().unwrap();
        Report {
            parameters: RunParameters::from(&config),
            flows,
            generators: vec![GeneratorReport {
                direction: Direction::Downlink,
                stats: GeneratorStats::default(),
                socket: SocketStats::default(),
            }],
            diagnostics: Diagnostics::default(),
        }
    }

    #[test]
    fn test_format_bit_rate() {
        assert_eq!(format_bit_rate(0.0), "0.000 bps");
        assert_eq!(format_bit_rate(999.0), "999.000 bps");
        assert_eq!(format_bit_rate(1_852_000.0), "1.852 Mbps");
        assert_eq!(format_bit_rate(100e6), "100.000 Mbps");
        assert_eq!(format_bit_rate(2.5e9), "2.500 Gbps");
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(Duration::ZERO), "0");
        assert_eq!(format_seconds(Duration::from_millis(7)), "0.007");
        assert_eq!(format_seconds(Duration::from_millis(43)), "0.043");
        assert_eq!(format_seconds(Duration::from_millis(2500)), "2.5");
        assert_eq!(format_seconds(Duration::from_nanos(1)), "0.000000001");
        assert_eq!(format_seconds(Duration::from_secs(3)), "3");
    }

    #[test]
    fn test_flow_section() {
        let mut monitor = FlowMonitor::new(Ipv4FlowClassifier, MonitorConfig::default()).unwrap();
        let h = header();
        for uid in 0..3u64 {
            monitor.track_send(&h, uid, 1000, ms(uid));
            monitor.track_receive(&h, uid, 1000, ms(uid) + Duration::from_micros(10_500));
        }

        let text = FlowTable::new(&monitor.snapshot(), Duration::from_secs(1)).to_string();

        assert!(text.starts_with("Flow 1 (10.1.1.1 -> 10.1.1.2)\n"));
        assert!(text.contains("  Tx Packets: 3\n"));
        assert!(text.contains("  Rx Bytes:   3000\n"));
        assert!(text.contains("  TxOffered:  24.000 kbps\n"));
        assert!(text.contains("  Throughput: 24.000 kbps\n"));
        assert!(text.contains("  Mean Delay:  10.500 ms\n"));
        assert!(text.contains("Delay Histogram\nBin Start (s)"));
        // Delay rows stop at bin 10
        assert!(text.contains(&row("0.01", "0.011", 3)));
        assert!(!text.contains(&row("0.011", "0.012", 0)));
        // Equal delays: all jitter in the first bin
        assert!(text.contains(&row("0", "0.001", 2)));
        assert_eq!(text.matches(SEPARATOR).count(), 2);
    }

    #[test]
    fn test_zero_packet_flow_still_rendered() {
        let mut monitor = FlowMonitor::new(Ipv4FlowClassifier, MonitorConfig::default()).unwrap();
        let key = Ipv4FlowClassifier.classify(&header().reversed());
        monitor.on_send(key, 0, ms(0));

        let text = FlowTable::new(&monitor.snapshot(), Duration::from_secs(30)).to_string();

        assert!(text.contains("Flow 1 (10.1.1.2 -> 10.1.1.1)"));
        assert!(text.contains("  Rx Packets: 0\n"));
        assert!(text.contains("  Mean Delay:  n/a\n"));
        // One row per empty histogram
        assert_eq!(text.matches(&row("0", "0.001", 0)).count(), 2);
    }

    #[test]
    fn test_terminal_bin_prints_inf() {
        let config = MonitorConfig {
            bin_count: 3,
            ..MonitorConfig::default()
        };
        let mut monitor = FlowMonitor::new(Ipv4FlowClassifier, config).unwrap();
        let h = header();
        monitor.track_send(&h, 0, 100, ms(0));
        monitor.track_receive(&h, 0, 100, ms(500));

        let text = FlowTable::new(&monitor.snapshot(), Duration::from_secs(1)).to_string();
        assert!(text.contains(&row("0.002", "inf", 1)));
    }

    #[test]
    fn test_bin_edges_are_exact() {
        let mut monitor = FlowMonitor::new(Ipv4FlowClassifier, MonitorConfig::default()).unwrap();
        let h = header();
        monitor.track_send(&h, 0, 100, ms(0));
        monitor.track_receive(&h, 0, 100, ms(43));

        let text = FlowTable::new(&monitor.snapshot(), Duration::from_secs(1)).to_string();
        assert!(text.contains(&row("0.043", "0.044", 1)));
        assert!(text.contains(&row("0.042", "0.043", 0)));
        assert!(!text.contains("0.043000000"));
    }

    #[test]
    fn test_full_report_sections() {
        let text = report(FlowSnapshot {
            flows: Vec::new(),
            unattributed: 0,
            in_flight: 0,
        })
        .render();

        assert!(text.starts_with("=== Video traffic report ===\n"));
        assert!(text.contains("Quality: bv1 (scale 6950, shape 0.8099)"));
        assert!(text.contains("No flows observed."));
        assert!(text.contains("=== Generators ===\ndownlink: frames 0"));
        assert!(text.contains("  socket: accepted 0 (0 bytes), deferred 0, refused 0, packets 0\n"));
        assert!(text.contains("| Jitter: off\n"));
        assert!(text.contains("Unattributed samples: 0 | ACK drops: 0"));
        assert!(text.contains("TCP acknowledgments"));
    }

    #[test]
    fn test_render_is_stable() {
        let r = report(FlowSnapshot {
            flows: Vec::new(),
            unattributed: 0,
            in_flight: 0,
        });
        assert_eq!(r.render(), r.render());
    }
}

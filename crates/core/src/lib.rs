//! vidsim-core: discrete-event simulation of video traffic over a point-to-point link
//!
//! This library provides the components of a measurement harness that:
//! - Generates video frames with Weibull-distributed sizes at a fixed interval
//! - Splits frames into transport sends over a stream socket, back-to-back
//!   or spaced by Gamma-distributed gaps
//! - Carries the resulting packets over a simulated 100 Mbps link
//! - Classifies received packets into flows and accumulates delay and jitter
//! - Renders a per-flow report at the end of the run
//!
//! # Architecture
//!
//! - `time`, `scheduler`: virtual clock and FIFO-stable event queue
//! - `packet`, `link`, `transport`: packets, the link, sockets and ACKs
//! - `traffic`: frame-size sampler, frame scheduler and segmenter
//! - `classifier`, `histogram`, `monitor`: flow measurement
//! - `report`: end-of-run text report
//! - `config`, `simulation`: validated configuration and the run context
//!
//! # Design Principles
//!
//! - **Single-threaded**: one event loop on a virtual clock, no locks
//! - **Deterministic**: seeded randomness and FIFO tie-breaking make runs reproducible
//! - **Validated up front**: a built configuration always runs
//! - **Counted, not swallowed**: failures end up in the report

pub mod capture;
pub mod classifier;
pub mod config;
pub mod error;
pub mod histogram;
pub mod link;
pub mod monitor;
pub mod packet;
pub mod report;
pub mod scheduler;
pub mod simulation;
pub mod time;
pub mod traffic;
pub mod transport;

// Re-export commonly used types
pub use config::{ConfigBuilder, SimulationConfig};
pub use error::{Error, Result};
pub use report::Report;
pub use simulation::{RunSummary, Simulation, Topology};

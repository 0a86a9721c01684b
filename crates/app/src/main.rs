//! vidsim: run one video traffic simulation and print its flow report.
//!
//! The report goes to stdout; logs go to stderr. Exit status is 0 on success,
//! 2 when the configuration is rejected (nothing runs and no report is
//! printed), and 1 for any other failure.

mod config;

use clap::Parser;
use config::Args;
use std::io::{self, Write};
use std::process::ExitCode;
use tracing::{error, info};
use vidsim_core::{Error, Simulation};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .with_writer(io::stderr)
        .init();

    let stdout = io::stdout();
    ExitCode::from(run(&args, &mut stdout.lock()))
}

/// Build, run and report one simulation, writing the report to `out`.
///
/// Returns the process exit status.
fn run(args: &Args, out: &mut impl Write) -> u8 {
    let config = match args.to_builder().build() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return EXIT_CONFIG;
        }
    };
    if args.print_config {
        if let Err(e) = writeln!(out, "{config}") {
            eprintln!("error: failed to write configuration: {e}");
            return EXIT_FAILURE;
        }
    }

    let mut simulation = match Simulation::build(config) {
        Ok(simulation) => simulation,
        Err(e @ Error::Config(_)) => {
            eprintln!("error: {e}");
            return EXIT_CONFIG;
        }
        Err(e) => {
            error!(%e, "failed to build simulation");
            eprintln!("error: {e}");
            return EXIT_FAILURE;
        }
    };

    let summary = simulation.run();
    info!(
        events = summary.events_processed,
        discarded = summary.discarded_events,
        "run complete"
    );

    let report = simulation.report();
    let written = if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => writeln!(out, "{json}"),
            Err(e) => {
                eprintln!("error: failed to serialize report: {e}");
                return EXIT_FAILURE;
            }
        }
    } else {
        write!(out, "{}", report.render())
    };
    if let Err(e) = written {
        eprintln!("error: failed to write report: {e}");
        return EXIT_FAILURE;
    }

    0
}

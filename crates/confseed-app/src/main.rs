#![forbid(unsafe_code)]
#![deny(unused_must_use, missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

//! Binary entrypoint: parse arguments, run once, and map the outcome to an exit status.

use std::process::ExitCode;

use clap::Parser;
use confseed_app::{Cli, run_app};
use confseed_fsops::error_chain;

/// Exit status when the run could not start at all.
const BOOTSTRAP_FAILURE: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_app(&cli) {
        Ok(report) => {
            for line in &report.failures {
                eprintln!("failed: {line}");
            }
            ExitCode::from(report.exit_code())
        }
        Err(err) => {
            eprintln!("error: {}", error_chain(&err));
            ExitCode::from(BOOTSTRAP_FAILURE)
        }
    }
}

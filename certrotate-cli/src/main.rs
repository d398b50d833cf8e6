//! `certrotate`: run certificate rotation phases from the command line.
//!
//! Each subcommand builds the same event a device would publish on its
//! request topic, hands it to the rotation service and prints the payload
//! that was published back to the device.
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).

mod commands;
mod exit_codes;

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Cli;
use crate::exit_codes::codes;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("Failed to install log subscriber: {e}");
    }

    let cli = Cli::parse();
    match commands::run(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::from(codes::GENERIC_ERROR)
        }
    }
}

/// Installs the stderr subscriber, which also picks up the core's `log` records.
fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
}

//! ggtest - operator CLI for edge runtime acceptance test runs.
//!
//! Packages local components, deploys them to a device or group, waits for a
//! verdict and tears everything down again.

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.init_tracing();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}

//! ember - drive the actor runtime from the command line.
//!
//! Subcommands run small, self-contained actor systems:
//! - `counter` sends a burst of asks to a counting actor
//! - `crash` feeds failures to a supervised actor and reports the outcome
//! - `config` prints the effective configuration

use anyhow::Result;
use clap::Parser;

mod commands;
mod error;
mod output;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}

//! Command-line utility for ecrecord layouts, instances and expressions.
//!
//! Provides commands for:
//! - Printing class layouts built from a JSON schema
//! - Dumping instance memory built from JSON values
//! - Evaluating and parsing expressions

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = commands::run(&cli.command)?;
    println!("{}", output.trim_end());
    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

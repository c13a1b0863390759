//! stacklint CLI - static analysis for Infrastructure-as-Code.
//!
//! Thin front-end over `stacklint-core`: argument parsing, logging setup,
//! and exit-code policy live here; everything else is the core's job.

use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Commands};

/// Execute the stacklint CLI with the current environment.
///
/// The process exits non-zero when a scan produced findings, mirroring the
/// convention of other static-analysis tools.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(cli.verbose);

    match cli.command {
        Commands::Scan(args) => {
            let findings = commands::scan(args).await?;
            if findings > 0 {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

/// Route `tracing` output to stderr, honouring `RUST_LOG` and `-v` flags.
fn initialize_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

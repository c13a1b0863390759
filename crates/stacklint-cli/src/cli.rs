//! Argument parsing for the `stacklint` CLI.
//!
//! One command, one job: scan a tree of IaC sources against a policy bundle
//! and report what it finds.
//!
//! ```bash
//! stacklint scan deploy/ --policies ./policies
//! stacklint scan deploy/ --policies ./policies --format json --report-path report.json
//! stacklint scan . --policies ./policies --exclude vendor --exclude third_party
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level CLI for `stacklint`.
#[derive(Debug, Parser)]
#[command(name = "stacklint", version, about = "Static analysis for Infrastructure-as-Code")]
pub struct Cli {
    /// Increase log verbosity (repeat for more).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan one or more roots for IaC misconfigurations.
    Scan(ScanArgs),
}

/// Output format for the scan report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    /// Human-readable summary.
    Text,
    /// Machine-readable JSON.
    Json,
}

/// Arguments for `stacklint scan`.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Filesystem roots to scan.
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Policy bundle directory.
    #[arg(short, long, env = "STACKLINT_POLICIES")]
    pub policies: PathBuf,

    /// Optional TOML configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path substrings to exclude from the walk.
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Output format on stdout.
    #[arg(long, value_enum, default_value_t = Format::Text)]
    pub format: Format,

    /// Also write the full JSON report to this path.
    #[arg(long)]
    pub report_path: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_args_parse() {
        let cli = Cli::try_parse_from([
            "stacklint",
            "scan",
            "deploy/",
            "--policies",
            "./policies",
            "--exclude",
            "vendor",
            "--format",
            "json",
        ])
        .unwrap();
        let Commands::Scan(args) = cli.command;
        assert_eq!(args.paths, vec![PathBuf::from("deploy/")]);
        assert_eq!(args.policies, PathBuf::from("./policies"));
        assert_eq!(args.exclude, vec!["vendor".to_string()]);
        assert_eq!(args.format, Format::Json);
        assert!(args.report_path.is_none());
    }

    #[test]
    fn policies_flag_is_required() {
        assert!(Cli::try_parse_from(["stacklint", "scan", "deploy/"]).is_err());
    }
}

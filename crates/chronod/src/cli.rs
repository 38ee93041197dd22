//! Command-line surface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "chronod", version, about = "A minute-granular job scheduler daemon")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the scheduler daemon and its HTTP control plane. Default when
    /// no subcommand is given.
    Serve,

    /// Load and validate the configuration and job table without starting
    /// the daemon. Exits nonzero if any error-severity issue is found.
    Validate,

    /// Convert a legacy crontab file into a chronod job table.
    Convert {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
}

/// Path to the daemon config file: `$CHRONOD_CONFIG`, or `config.toml`.
pub fn config_path() -> PathBuf {
    std::env::var("CHRONOD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"))
}

//! CLI command definitions
//!
//! Defines the clap commands for the winprobe CLI.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Run one or more YAML scenario suites
    Run {
        /// Paths to suite files, run in order
        #[arg(required = true)]
        suites: Vec<PathBuf>,
    },

    /// List the windows an application currently exposes
    Targets {
        /// DevTools endpoint (`host:port`, http(s) or ws(s) URL)
        endpoint: String,

        /// Annotate targets with window names from this suite
        #[arg(long)]
        suite: Option<PathBuf>,
    },
}

//! winprobe - end-to-end checks for multi-window desktop web applications
//!
//! Runs YAML scenario suites against applications exposing a Chrome
//! DevTools endpoint.

use clap::Parser;
use winprobe::{cli, commands, common::logging};
use commands::Commands;

#[derive(Parser)]
#[command(name = "winprobe", about = "Window-level E2E checks over the DevTools protocol")]
#[command(version, long_about = None)]
struct Cli {
    /// Show debug logs, including CDP traffic
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_cli(cli.verbose);

    match cli::dispatch(cli.command, cli.verbose).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}

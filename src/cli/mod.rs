//! CLI command handling
//!
//! Dispatches CLI commands to the suite runner and formats output.

use std::path::Path;

use colored::Colorize;

use crate::cdp::Endpoint;
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::Result;
use crate::connection::Connection;
use crate::testing::{self, TestSuite};
use crate::window::WindowTable;

/// Dispatch a CLI command
///
/// Returns `Ok(false)` when the command ran but checks failed.
pub async fn dispatch(command: Commands, verbose: bool) -> Result<bool> {
    let config = Config::load()?;

    match command {
        Commands::Run { suites } => {
            let mut all_passed = true;
            for path in &suites {
                let report = testing::run_suite_file(path, &config, verbose).await?;
                all_passed &= report.passed();
            }
            if suites.len() > 1 {
                let status = if all_passed {
                    "All suites passed".green().bold()
                } else {
                    "Some suites failed".red().bold()
                };
                println!("{}", status);
            }
            Ok(all_passed)
        }

        Commands::Targets { endpoint, suite } => {
            let table = match suite {
                Some(path) => Some(load_table(&path)?),
                None => None,
            };
            list_targets(&endpoint, table.as_ref(), &config).await?;
            Ok(true)
        }
    }
}

fn load_table(path: &Path) -> Result<WindowTable> {
    Ok(TestSuite::load(path)?.windows)
}

async fn list_targets(endpoint: &str, table: Option<&WindowTable>, config: &Config) -> Result<()> {
    let endpoint = Endpoint::parse(endpoint)?;
    let mut conn = Connection::attach(&endpoint, config).await?;

    let listed = print_targets(&mut conn, table).await;
    conn.close().await;
    listed
}

async fn print_targets(conn: &mut Connection, table: Option<&WindowTable>) -> Result<()> {
    let contexts = conn.contexts().await?;
    if contexts.is_empty() {
        println!("No windows");
        return Ok(());
    }

    for context in &contexts {
        println!(
            "{} {}",
            "Context:".cyan(),
            context.id.as_deref().unwrap_or("default")
        );
        let targets = conn.targets(context).await?;
        for target in &targets {
            let name = table.and_then(|t| t.name_of(target)).unwrap_or("-");
            println!("  {:<14} {}  {}", name.bold(), target.id.dimmed(), target.url);
        }

        if let Some(table) = table {
            for (name, found) in table.match_all(&targets) {
                match found.len() {
                    0 => println!("  {:<14} {}", name, "(absent)".yellow()),
                    1 => {}
                    n => println!("  {:<14} {}", name, format!("(ambiguous: {} targets)", n).red()),
                }
            }
        }
    }

    Ok(())
}

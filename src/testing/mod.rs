//! Scenario suites
//!
//! Reads YAML suites and runs their scenarios against a live application,
//! asserting on typed observations rather than on page text.

mod config;
#[cfg(test)]
pub(crate) mod fake;
mod runner;

pub use config::*;
pub use runner::{
    run_suite, run_suite_file, run_with_connection, Outcome, ScenarioContext, ScenarioResult,
    SuiteReport,
};

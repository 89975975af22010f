//! Test suite configuration types
//!
//! Defines the data structures for deserializing YAML test suites.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::common::config::AmbiguityPolicy;
use crate::common::{Error, Result};
use crate::observe::{Observation, Query, QuerySet};
use crate::window::WindowTable;

/// A group of scenarios run against one application instance
#[derive(Deserialize, Debug)]
pub struct TestSuite {
    /// Name of the suite
    pub name: String,
    /// Optional description of what the suite verifies
    pub description: Option<String>,
    /// DevTools endpoint of the running application (`host:port` or URL)
    pub endpoint: String,
    /// Number of windows expected right after launch
    pub expected_window_count: Option<usize>,
    /// Logical window name to URL
    #[serde(default)]
    pub windows: WindowTable,
    /// Expressions backing the typed queries
    #[serde(default)]
    pub queries: QuerySet,
    /// Windows resolved during setup
    #[serde(default)]
    pub initial_windows: Vec<String>,
    /// Overrides the configured ambiguity policy
    pub ambiguity: Option<AmbiguityPolicy>,
    /// Scenarios, run in order
    pub scenarios: Vec<Scenario>,
}

/// One ordered sequence of steps
#[derive(Deserialize, Debug)]
pub struct Scenario {
    pub name: String,
    /// Earlier scenarios that must have passed for this one to run
    #[serde(default)]
    pub requires: Vec<String>,
    pub steps: Vec<TestStep>,
}

/// A single test step
#[derive(Deserialize, Debug)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Check the number of contexts
    ExpectContexts { count: usize },
    /// Check the number of windows seen at setup
    ExpectInitialWindows {
        /// Defaults to the suite's `expected_window_count`
        count: Option<usize>,
    },
    /// Check the live number of windows
    ExpectWindowCount {
        count: usize,
        within_ms: Option<u64>,
    },
    /// Check that a window is (or is not) among the current targets
    ExpectWindow {
        window: String,
        #[serde(default = "default_true")]
        present: bool,
        within_ms: Option<u64>,
    },
    /// Click an element inside a window
    Click {
        window: String,
        selector: String,
        /// The click shuts the application down
        #[serde(default)]
        terminal: bool,
    },
    /// Fixed delay
    Wait { ms: u64 },
    /// Ask a typed query and check the answer
    Query {
        window: Option<String>,
        query: Query,
        #[serde(default)]
        expect: QueryExpectation,
        within_ms: Option<u64>,
    },
}

fn default_true() -> bool {
    true
}

impl TestStep {
    /// Short label for report lines
    pub fn describe(&self) -> String {
        match self {
            TestStep::ExpectContexts { count } => format!("expect {} context(s)", count),
            TestStep::ExpectInitialWindows { count } => match count {
                Some(count) => format!("expect {} initial window(s)", count),
                None => "expect initial window count".to_string(),
            },
            TestStep::ExpectWindowCount { count, .. } => format!("expect {} window(s)", count),
            TestStep::ExpectWindow {
                window, present, ..
            } => {
                if *present {
                    format!("expect window '{}'", window)
                } else {
                    format!("expect no window '{}'", window)
                }
            }
            TestStep::Click {
                window, selector, ..
            } => format!("click {} in '{}'", selector, window),
            TestStep::Wait { ms } => format!("wait {}ms", ms),
            TestStep::Query { window, query, .. } => match window {
                Some(window) => format!("query {} of '{}'", query, window),
                None => format!("query {}", query),
            },
        }
    }

    /// Window names this step refers to
    fn window(&self) -> Option<&str> {
        match self {
            TestStep::ExpectWindow { window, .. } | TestStep::Click { window, .. } => {
                Some(window.as_str())
            }
            TestStep::Query { window, .. } => window.as_deref(),
            _ => None,
        }
    }
}

/// Expected answer of a query
#[derive(Deserialize, Debug, Default)]
pub struct QueryExpectation {
    /// Exact literal (string, bool or number)
    pub equals: Option<Value>,
    /// Regular expression over the textual answer
    pub matches: Option<String>,
}

impl QueryExpectation {
    /// Check an observation; `Err` only for an invalid pattern
    pub fn check(&self, observed: &Observation) -> Result<bool> {
        if let Some(expected) = &self.equals {
            if !observed.equals_literal(expected) {
                return Ok(false);
            }
        }
        if let Some(pattern) = &self.matches {
            let re = compile(pattern)?;
            if !re.is_match(&observed.to_string()) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn describe(&self) -> String {
        match (&self.equals, &self.matches) {
            (Some(value), Some(pattern)) => format!("{} matching /{}/", value, pattern),
            (Some(value), None) => value.to_string(),
            (None, Some(pattern)) => format!("/{}/", pattern),
            (None, None) => "any value".to_string(),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| Error::Config(format!("Invalid pattern '{}': {}", pattern, e)))
}

impl TestSuite {
    /// Load and validate a suite from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("In '{}': {}", path.display(), e)))
    }

    /// Parse and validate a suite from YAML text
    pub fn parse(content: &str) -> Result<Self> {
        let suite: TestSuite = serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigParse(format!("Failed to parse test suite: {}", e)))?;
        suite.validate()?;
        Ok(suite)
    }

    /// Catch configuration mistakes before attaching
    pub fn validate(&self) -> Result<()> {
        for name in &self.initial_windows {
            self.windows.locator(name)?;
        }

        let mut seen: HashSet<&str> = HashSet::new();
        for scenario in &self.scenarios {
            for required in &scenario.requires {
                if !seen.contains(required.as_str()) {
                    return Err(Error::Config(format!(
                        "Scenario '{}' requires '{}', which is not an earlier scenario",
                        scenario.name, required
                    )));
                }
            }
            if !seen.insert(&scenario.name) {
                return Err(Error::Config(format!(
                    "Duplicate scenario name '{}'",
                    scenario.name
                )));
            }

            for step in &scenario.steps {
                if let Some(window) = step.window() {
                    self.windows.locator(window)?;
                }
                if let TestStep::Query {
                    window,
                    query,
                    expect,
                    ..
                } = step
                {
                    if query.needs_window() && window.is_none() {
                        return Err(Error::Config(format!(
                            "Scenario '{}': query {} needs a window",
                            scenario.name, query
                        )));
                    }
                    if let Some(pattern) = &expect.matches {
                        compile(pattern)?;
                    }
                }
                if let TestStep::ExpectInitialWindows { count: None } = step {
                    if self.expected_window_count.is_none() {
                        return Err(Error::Config(format!(
                            "Scenario '{}': expect_initial_windows needs a count or expected_window_count",
                            scenario.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

//! Test runner implementation
//!
//! Attaches once per suite, runs the scenarios in order against a shared
//! [`ScenarioContext`], and always closes the connection at the end.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use colored::Colorize;

use crate::actions;
use crate::cdp::Endpoint;
use crate::common::config::{AmbiguityPolicy, Config};
use crate::common::{Error, Result};
use crate::connection::{Connection, Context};
use crate::driver::Target;
use crate::observe::{self, Observation, Poller, QuerySet, RetryPolicy};
use crate::window::{Resolution, WindowTable};

use super::config::{Scenario, TestStep, TestSuite};

/// How a scenario ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Failed(String),
    Skipped(String),
}

/// Result of one scenario
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub outcome: Outcome,
    pub steps_run: usize,
    pub steps_total: usize,
}

/// Result of a suite run
#[derive(Debug)]
pub struct SuiteReport {
    pub name: String,
    pub results: Vec<ScenarioResult>,
    /// Set when a fatal error stopped the suite
    pub aborted: Option<String>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.aborted.is_none() && self.results.iter().all(|r| r.outcome == Outcome::Passed)
    }

    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.outcome)).count()
    }

    /// Outcome of the scenario called `name`
    pub fn outcome(&self, name: &str) -> Option<&Outcome> {
        self.results
            .iter()
            .find(|r| r.name == name)
            .map(|r| &r.outcome)
    }
}

/// State shared by the scenarios of one suite
///
/// Built by setup, consumed by teardown. Holds no resolved windows: every
/// step re-lists targets and resolves again.
pub struct ScenarioContext {
    connection: Connection,
    context: Context,
    table: WindowTable,
    queries: QuerySet,
    ambiguity: AmbiguityPolicy,
    poll_interval: Duration,
    default_within: Duration,
    /// Targets seen right after attach
    initial_targets: Vec<Target>,
    expected_window_count: Option<usize>,
}

impl ScenarioContext {
    /// Check the attachment and take the initial window snapshot
    ///
    /// The connection is closed if setup fails.
    pub async fn setup(suite: &TestSuite, mut connection: Connection, config: &Config) -> Result<Self> {
        let ambiguity = suite.ambiguity.unwrap_or(config.resolver.ambiguity);

        let prepared = prepare(&mut connection, suite, ambiguity).await;
        let (context, initial_targets) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                connection.close().await;
                return Err(e);
            }
        };

        Ok(Self {
            connection,
            context,
            table: suite.windows.clone(),
            queries: suite.queries.clone(),
            ambiguity,
            poll_interval: config.retry.poll_interval(),
            default_within: Duration::from_millis(config.retry.default_within_ms),
            initial_targets,
            expected_window_count: suite.expected_window_count,
        })
    }

    pub fn initial_targets(&self) -> &[Target] {
        &self.initial_targets
    }

    fn retry(&self, within_ms: Option<u64>) -> RetryPolicy {
        let timeout = within_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_within);
        RetryPolicy::new(self.poll_interval, timeout)
    }

    /// Re-list targets and resolve `name` against them
    async fn find_window(&mut self, name: &str) -> Result<Option<Target>> {
        let targets = self.connection.targets(&self.context).await?;
        let resolution = self.table.resolve(name, &targets, self.ambiguity)?;
        Ok(resolution.target().cloned())
    }

    /// Close the connection, tolerating an application that already exited
    pub async fn teardown(mut self) {
        self.connection.close().await;
    }
}

async fn prepare(
    connection: &mut Connection,
    suite: &TestSuite,
    ambiguity: AmbiguityPolicy,
) -> Result<(Context, Vec<Target>)> {
    let context = connection.single_context().await?;
    let targets = connection.targets(&context).await?;

    for name in &suite.initial_windows {
        match suite.windows.resolve(name, &targets, ambiguity)? {
            Resolution::Found(target) => {
                tracing::debug!("Window '{}' is target {}", name, target.id);
            }
            Resolution::NotFound => {
                tracing::warn!("Window '{}' not present at setup", name);
            }
        }
    }

    Ok((context, targets))
}

/// Load a suite file and run it
pub async fn run_suite_file(path: &Path, config: &Config, verbose: bool) -> Result<SuiteReport> {
    let suite = TestSuite::load(path)?;
    Ok(run_suite(&suite, config, verbose).await)
}

/// Attach to the suite's endpoint and run it
pub async fn run_suite(suite: &TestSuite, config: &Config, verbose: bool) -> SuiteReport {
    print_header(suite);

    let attached = match Endpoint::parse(&suite.endpoint) {
        Ok(endpoint) => Connection::attach(&endpoint, config).await,
        Err(e) => Err(e),
    };

    match attached {
        Ok(connection) => execute(suite, connection, config, verbose).await,
        Err(e) => abort_at_setup(suite, e),
    }
}

/// Run a suite over an existing connection
pub async fn run_with_connection(
    suite: &TestSuite,
    connection: Connection,
    config: &Config,
    verbose: bool,
) -> SuiteReport {
    print_header(suite);
    execute(suite, connection, config, verbose).await
}

fn print_header(suite: &TestSuite) {
    println!(
        "\n{} {}",
        "Running Suite:".blue().bold(),
        suite.name.white().bold()
    );
    if let Some(desc) = &suite.description {
        println!("  {}", desc.dimmed());
    }
}

async fn execute(
    suite: &TestSuite,
    connection: Connection,
    config: &Config,
    verbose: bool,
) -> SuiteReport {
    println!("\n{}", "Setup:".cyan());
    let endpoint = connection.endpoint().to_string();

    let mut ctx = match ScenarioContext::setup(suite, connection, config).await {
        Ok(ctx) => ctx,
        Err(e) => return abort_at_setup(suite, e),
    };

    println!(
        "  {} Attached to {} ({} window(s))",
        "✓".green(),
        endpoint,
        ctx.initial_targets().len()
    );
    if verbose {
        for target in ctx.initial_targets() {
            let name = ctx.table.name_of(target).unwrap_or("-");
            println!("    {} {} {}", name.dimmed(), target.id.dimmed(), target.url.dimmed());
        }
    }

    let mut results = Vec::with_capacity(suite.scenarios.len());
    let mut passed: HashSet<&str> = HashSet::new();
    let mut aborted: Option<String> = None;

    for scenario in &suite.scenarios {
        println!("\n{}", scenario.name.white().bold());

        if let Some(reason) = &aborted {
            let reason = format!("suite aborted: {}", reason);
            println!("  {} {}", "-".yellow(), reason.dimmed());
            results.push(skipped(scenario, reason));
            continue;
        }

        if let Some(missing) = scenario
            .requires
            .iter()
            .find(|r| !passed.contains(r.as_str()))
        {
            let reason = format!("requires '{}', which did not pass", missing);
            println!("  {} {}", "-".yellow(), reason.dimmed());
            results.push(skipped(scenario, reason));
            continue;
        }

        let (result, fatal) = run_scenario(&mut ctx, scenario, verbose).await;
        if let Some(e) = fatal {
            aborted = Some(e);
        }
        if result.outcome == Outcome::Passed {
            passed.insert(&scenario.name);
        }
        results.push(result);
    }

    ctx.teardown().await;

    let report = SuiteReport {
        name: suite.name.clone(),
        results,
        aborted,
    };
    print_summary(&report);
    report
}

fn skipped(scenario: &Scenario, reason: String) -> ScenarioResult {
    ScenarioResult {
        name: scenario.name.clone(),
        outcome: Outcome::Skipped(reason),
        steps_run: 0,
        steps_total: scenario.steps.len(),
    }
}

fn abort_at_setup(suite: &TestSuite, error: Error) -> SuiteReport {
    println!("  {} {}", "✗".red(), error);
    let reason = error.to_string();
    let report = SuiteReport {
        name: suite.name.clone(),
        results: suite
            .scenarios
            .iter()
            .map(|s| skipped(s, format!("setup failed: {}", reason)))
            .collect(),
        aborted: Some(reason),
    };
    print_summary(&report);
    report
}

fn print_summary(report: &SuiteReport) {
    let passed = report.count(|o| *o == Outcome::Passed);
    let failed = report.count(|o| matches!(o, Outcome::Failed(_)));
    let skipped = report.count(|o| matches!(o, Outcome::Skipped(_)));

    let line = format!("{} passed, {} failed, {} skipped", passed, failed, skipped);
    if report.passed() {
        println!("\n{} {}\n", "✓".green().bold(), line.green().bold());
    } else {
        println!("\n{} {}\n", "✗".red().bold(), line.red().bold());
    }
}

/// Run one scenario; the second value carries a fatal error message
async fn run_scenario(
    ctx: &mut ScenarioContext,
    scenario: &Scenario,
    verbose: bool,
) -> (ScenarioResult, Option<String>) {
    let steps_total = scenario.steps.len();

    for (i, step) in scenario.steps.iter().enumerate() {
        let step_num = i + 1;

        match execute_step(ctx, step).await {
            Ok(detail) => {
                if detail.is_empty() || !verbose {
                    println!("  {} Step {}: {}", "✓".green(), step_num, step.describe().dimmed());
                } else {
                    println!(
                        "  {} Step {}: {} ({})",
                        "✓".green(),
                        step_num,
                        step.describe().dimmed(),
                        detail.dimmed()
                    );
                }
            }
            Err(e) => {
                println!("  {} Step {}: {}", "✗".red(), step_num, e);
                let fatal = e.is_fatal().then(|| e.to_string());
                let result = ScenarioResult {
                    name: scenario.name.clone(),
                    outcome: Outcome::Failed(e.to_string()),
                    steps_run: step_num,
                    steps_total,
                };
                return (result, fatal);
            }
        }
    }

    let result = ScenarioResult {
        name: scenario.name.clone(),
        outcome: Outcome::Passed,
        steps_run: steps_total,
        steps_total,
    };
    (result, None)
}

/// Execute a single step, returning a detail line for verbose output
async fn execute_step(ctx: &mut ScenarioContext, step: &TestStep) -> Result<String> {
    match step {
        TestStep::ExpectContexts { count } => {
            let found = ctx.connection.contexts().await?.len();
            if found != *count {
                return Err(Error::mismatch("context count", count, found));
            }
            Ok(String::new())
        }
        TestStep::ExpectInitialWindows { count } => {
            let expected = count.or(ctx.expected_window_count).ok_or_else(|| {
                Error::Config("No expected window count configured".to_string())
            })?;
            let found = ctx.initial_targets.len();
            if found != expected {
                return Err(Error::mismatch("initial window count", expected, found));
            }
            Ok(String::new())
        }
        TestStep::ExpectWindowCount { count, within_ms } => {
            execute_window_count_step(ctx, *count, *within_ms).await
        }
        TestStep::ExpectWindow {
            window,
            present,
            within_ms,
        } => execute_window_step(ctx, window, *present, *within_ms).await,
        TestStep::Click {
            window,
            selector,
            terminal,
        } => execute_click_step(ctx, window, selector, *terminal).await,
        TestStep::Wait { ms } => {
            observe::wait_for(Duration::from_millis(*ms)).await;
            Ok(String::new())
        }
        TestStep::Query { .. } => execute_query_step(ctx, step).await,
    }
}

async fn execute_window_count_step(
    ctx: &mut ScenarioContext,
    count: usize,
    within_ms: Option<u64>,
) -> Result<String> {
    let mut poller = Poller::new(ctx.retry(within_ms));
    let mut last = 0;

    while poller.next_attempt().await {
        last = observe::window_count(&mut ctx.connection, &ctx.context).await?;
        if last == count {
            return Ok(format!("after {} attempt(s)", poller.attempts()));
        }
    }

    Err(Error::mismatch(
        &format!("window count after {}ms", poller.elapsed_ms()),
        count,
        last,
    ))
}

async fn execute_window_step(
    ctx: &mut ScenarioContext,
    window: &str,
    present: bool,
    within_ms: Option<u64>,
) -> Result<String> {
    let mut poller = Poller::new(ctx.retry(within_ms));

    while poller.next_attempt().await {
        let found = ctx.find_window(window).await?;
        if found.is_some() == present {
            return Ok(match found {
                Some(target) => format!("target {}", target.id),
                None => String::new(),
            });
        }
    }

    Err(Error::mismatch(
        &format!("window '{}' after {}ms", window, poller.elapsed_ms()),
        presence(present),
        presence(!present),
    ))
}

fn presence(present: bool) -> &'static str {
    if present {
        "present"
    } else {
        "absent"
    }
}

async fn execute_click_step(
    ctx: &mut ScenarioContext,
    window: &str,
    selector: &str,
    terminal: bool,
) -> Result<String> {
    let target = ctx
        .find_window(window)
        .await?
        .ok_or_else(|| Error::WindowNotFound(window.to_string()))?;

    if terminal {
        actions::click_terminal(&mut ctx.connection, &target, selector).await?;
    } else {
        actions::click(&mut ctx.connection, &target, selector).await?;
    }
    Ok(format!("target {}", target.id))
}

async fn execute_query_step(ctx: &mut ScenarioContext, step: &TestStep) -> Result<String> {
    let (window, query, expect, within_ms) = match step {
        TestStep::Query {
            window,
            query,
            expect,
            within_ms,
        } => (window.as_deref(), *query, expect, *within_ms),
        _ => return Err(Error::Internal("not a query step".to_string())),
    };

    let mut poller = Poller::new(ctx.retry(within_ms));
    let mut last: Option<Observation> = None;

    while poller.next_attempt().await {
        let target = match window {
            Some(name) => match ctx.find_window(name).await? {
                Some(target) => Some(target),
                None => continue,
            },
            None => None,
        };

        let observed = observe::read(
            &mut ctx.connection,
            &ctx.context,
            target.as_ref(),
            query,
            &ctx.queries,
        )
        .await?;

        if expect.check(&observed)? {
            return Ok(format!("observed {}", observed));
        }
        last = Some(observed);
    }

    match last {
        Some(observed) => Err(Error::mismatch(
            &format!("{} after {}ms", step.describe(), poller.elapsed_ms()),
            expect.describe(),
            observed,
        )),
        None => Err(Error::WindowNotFound(window.unwrap_or_default().to_string())),
    }
}

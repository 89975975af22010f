//! State observation
//!
//! Point-in-time reads of application state, plus the two ways of letting
//! asynchronous UI transitions settle: a fixed [`wait_for`] and a bounded
//! [`Poller`] that retries until a condition holds.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;

use crate::common::{Error, Result};
use crate::connection::{Connection, Context};
use crate::driver::Target;

/// The closed set of questions the harness asks an application
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Runtime version string, e.g. `21.93.63.4`
    Version,
    /// Whether the window the expression runs in is showing
    IsShowing,
    /// Number of windows in the context
    WindowCount,
}

impl Query {
    /// Whether the query runs inside a window
    pub fn needs_window(self) -> bool {
        !matches!(self, Query::WindowCount)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Version => write!(f, "version"),
            Query::IsShowing => write!(f, "is_showing"),
            Query::WindowCount => write!(f, "window_count"),
        }
    }
}

/// Application-specific expressions backing each query
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct QuerySet {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_is_showing")]
    pub is_showing: String,
}

fn default_version() -> String {
    "fin.System.getVersion()".to_string()
}

fn default_is_showing() -> String {
    "fin.Window.getCurrentSync().isShowing()".to_string()
}

impl Default for QuerySet {
    fn default() -> Self {
        Self {
            version: default_version(),
            is_showing: default_is_showing(),
        }
    }
}

impl QuerySet {
    /// Expression for `query`; `None` for queries answered without evaluation
    pub fn expression(&self, query: Query) -> Option<&str> {
        match query {
            Query::Version => Some(&self.version),
            Query::IsShowing => Some(&self.is_showing),
            Query::WindowCount => None,
        }
    }
}

/// Typed result of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Text(String),
    Flag(bool),
    Count(usize),
}

impl Observation {
    /// Compare against a literal from a suite file
    pub fn equals_literal(&self, literal: &Value) -> bool {
        match (self, literal) {
            (Observation::Text(s), Value::String(l)) => s == l,
            (Observation::Flag(b), Value::Bool(l)) => b == l,
            (Observation::Count(n), Value::Number(l)) => l.as_u64() == Some(*n as u64),
            _ => false,
        }
    }
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observation::Text(s) => write!(f, "{}", s),
            Observation::Flag(b) => write!(f, "{}", b),
            Observation::Count(n) => write!(f, "{}", n),
        }
    }
}

/// Evaluate a side-effect-free expression inside `target`
pub async fn read_expression(conn: &mut Connection, target: &Target, expression: &str) -> Result<Value> {
    conn.evaluate(target, expression).await
}

/// Number of windows currently in `context`
pub async fn window_count(conn: &mut Connection, context: &Context) -> Result<usize> {
    Ok(conn.targets(context).await?.len())
}

/// Answer `query`, inside `target` when the query needs a window
pub async fn read(
    conn: &mut Connection,
    context: &Context,
    target: Option<&Target>,
    query: Query,
    queries: &QuerySet,
) -> Result<Observation> {
    let expression = match queries.expression(query) {
        Some(expression) => expression,
        None => return Ok(Observation::Count(window_count(conn, context).await?)),
    };
    let target = target.ok_or_else(|| {
        Error::Config(format!("Query '{}' needs a window to run in", query))
    })?;

    let value = read_expression(conn, target, expression).await?;
    match (query, value) {
        (Query::Version, Value::String(version)) => Ok(Observation::Text(version)),
        (Query::IsShowing, Value::Bool(showing)) => Ok(Observation::Flag(showing)),
        (query, other) => Err(Error::evaluation(
            expression,
            format!("{} returned unexpected value {}", query, other),
        )),
    }
}

/// Fixed delay for UI transitions to settle
///
/// A heuristic, not a guarantee; prefer [`Poller`] for anything that can be
/// expressed as a condition.
pub async fn wait_for(duration: Duration) {
    tracing::debug!("Waiting {}ms", duration.as_millis());
    tokio::time::sleep(duration).await;
}

/// Bounds of a retry-until-condition loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub interval: Duration,
    /// No attempt starts after this much time has passed
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// A single attempt, no retries
    pub fn once() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

/// Paces the attempts of a bounded wait
///
/// ```ignore
/// let mut poller = Poller::new(policy);
/// while poller.next_attempt().await {
///     if condition_holds().await? {
///         return Ok(());
///     }
/// }
/// Err(poller.timed_out("condition"))
/// ```
#[derive(Debug)]
pub struct Poller {
    policy: RetryPolicy,
    started: Instant,
    attempts: u32,
}

impl Poller {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            started: Instant::now(),
            attempts: 0,
        }
    }

    /// Wait for the next attempt; `false` once the cap is exceeded
    ///
    /// The first attempt starts immediately, so a condition is always
    /// checked at least once.
    pub async fn next_attempt(&mut self) -> bool {
        if self.attempts > 0 {
            let elapsed = self.started.elapsed();
            if elapsed >= self.policy.timeout {
                return false;
            }
            let remaining = self.policy.timeout - elapsed;
            tokio::time::sleep(self.policy.interval.min(remaining)).await;
        }
        self.attempts += 1;
        true
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time spent since the first attempt
    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Error describing the exhausted wait
    pub fn timed_out(&self, what: impl Into<String>) -> Error {
        Error::WaitTimeout {
            what: what.into(),
            waited_ms: self.elapsed_ms(),
        }
    }
}

//! Connection handle
//!
//! Owns one attachment to a running application. Contexts and targets are
//! read from the remote on every call; nothing is cached here.

use std::fmt;

use serde_json::Value;

use crate::cdp::{CdpDriver, Endpoint};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::driver::{Driver, Target};

/// One browsing context of the attached application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    /// `browserContextId` shared by its targets; `None` for the default context
    pub id: Option<String>,
}

impl Context {
    fn contains(&self, target: &Target) -> bool {
        self.id == target.context_id
    }
}

/// Attachment to a remote debugging endpoint
pub struct Connection {
    endpoint: String,
    driver: Box<dyn Driver>,
    closed: bool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Attach to an application over CDP
    pub async fn attach(endpoint: &Endpoint, config: &Config) -> Result<Self> {
        let driver = CdpDriver::connect(endpoint, config).await?;
        Ok(Self::from_driver(endpoint.to_string(), driver))
    }

    /// Wrap an already attached driver
    pub fn from_driver(endpoint: impl Into<String>, driver: impl Driver + 'static) -> Self {
        Self {
            endpoint: endpoint.into(),
            driver: Box::new(driver),
            closed: false,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Disconnected)
        } else {
            Ok(())
        }
    }

    /// Contexts currently reported by the endpoint, in first-seen order
    pub async fn contexts(&mut self) -> Result<Vec<Context>> {
        self.ensure_open()?;
        let targets = self.driver.targets().await?;

        let mut contexts: Vec<Context> = Vec::new();
        for target in &targets {
            if !contexts.iter().any(|c| c.contains(target)) {
                contexts.push(Context {
                    id: target.context_id.clone(),
                });
            }
        }
        Ok(contexts)
    }

    /// The only context of the application
    ///
    /// Zero or several contexts is a failed precondition.
    pub async fn single_context(&mut self) -> Result<Context> {
        let mut contexts = self.contexts().await?;
        if contexts.len() != 1 {
            return Err(Error::UnexpectedContextCount {
                found: contexts.len(),
            });
        }
        Ok(contexts.remove(0))
    }

    /// Targets of `context` currently reported by the endpoint
    pub async fn targets(&mut self, context: &Context) -> Result<Vec<Target>> {
        self.ensure_open()?;
        let targets = self.driver.targets().await?;
        Ok(targets.into_iter().filter(|t| context.contains(t)).collect())
    }

    /// Evaluate an expression inside `target`
    pub async fn evaluate(&mut self, target: &Target, expression: &str) -> Result<Value> {
        self.ensure_open()?;
        tracing::debug!("Evaluating in {} ({}): {}", target.id, target.url, expression);
        self.driver.evaluate(&target.id, expression).await
    }

    /// Release the attachment
    ///
    /// Idempotent and silent: by teardown time the outcome is already
    /// decided, so a remote that already exited is not an error.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.driver.close().await;
        tracing::debug!("Connection to {} closed", self.endpoint);
    }

    /// Whether the connection was closed locally or lost remotely
    pub fn is_closed(&self) -> bool {
        self.closed || self.driver.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake::{page, FakeApp};

    #[tokio::test]
    async fn test_single_context() {
        let app = FakeApp::new(vec![page("main", "http://app/index.html")]);
        let mut conn = app.connect();

        let contexts = conn.contexts().await.unwrap();
        assert_eq!(contexts.len(), 1);
        let context = conn.single_context().await.unwrap();
        assert_eq!(conn.targets(&context).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_context_count_precondition() {
        let mut other = page("popup", "http://app/popup.html");
        other.context_id = Some("incognito".to_string());
        let app = FakeApp::new(vec![page("main", "http://app/index.html"), other]);
        let mut conn = app.connect();

        let err = conn.single_context().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedContextCount { found: 2 }));

        let empty = FakeApp::new(Vec::new());
        let mut conn = empty.connect();
        let err = conn.single_context().await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedContextCount { found: 0 }));
    }

    #[tokio::test]
    async fn test_targets_are_live() {
        let app = FakeApp::new(vec![page("main", "http://app/index.html")]);
        let mut conn = app.connect();
        let context = conn.single_context().await.unwrap();

        app.open(page("note", "http://app/notification.html"));
        let targets = conn.targets(&context).await.unwrap();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].url, "http://app/notification.html");
    }

    #[tokio::test]
    async fn test_debug_shows_endpoint_and_state() {
        let app = FakeApp::new(vec![page("main", "http://app/index.html")]);
        let mut conn = app.connect();
        assert_eq!(
            format!("{:?}", conn),
            "Connection { endpoint: \"fake://app\", closed: false, .. }"
        );

        conn.close().await;
        assert!(format!("{:?}", conn).contains("closed: true"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_after_exit() {
        let app = FakeApp::new(vec![page("main", "http://app/index.html")]);
        let mut conn = app.connect();

        app.exit();
        assert!(conn.is_closed());
        conn.close().await;
        conn.close().await;
        assert!(conn.is_closed());
        assert!(matches!(conn.contexts().await, Err(Error::Disconnected)));
    }
}

//! The automation capability the harness consumes
//!
//! A [`Driver`] lists the windows of a running application and evaluates
//! expressions inside them. [`crate::cdp::CdpDriver`] talks to a real
//! DevTools endpoint; tests plug in their own.

use async_trait::async_trait;
use serde_json::Value;

use crate::cdp::TargetInfo;
use crate::common::Result;

/// One remote window of the application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Protocol identifier, only stable while the window lives
    pub id: String,
    /// Resource locator of the loaded content
    pub url: String,
    pub title: String,
    /// Browsing context the window belongs to (`None` = default context)
    pub context_id: Option<String>,
}

impl From<TargetInfo> for Target {
    fn from(info: TargetInfo) -> Self {
        Self {
            id: info.target_id,
            url: info.url,
            title: info.title,
            context_id: info.browser_context_id,
        }
    }
}

/// Access to the windows of one running application
#[async_trait]
pub trait Driver: Send {
    /// Current application windows, in enumeration order
    async fn targets(&mut self) -> Result<Vec<Target>>;

    /// Evaluate `expression` in the window `target_id` and return its value
    ///
    /// Fails with `Error::Evaluation` if the window is gone or the
    /// expression throws.
    async fn evaluate(&mut self, target_id: &str, expression: &str) -> Result<Value>;

    /// Release the attachment; must not fail if the remote already exited
    async fn close(&mut self);

    /// Whether the attachment is known to be gone
    fn is_closed(&self) -> bool;
}

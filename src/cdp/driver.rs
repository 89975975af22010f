//! [`Driver`] implementation over the DevTools protocol

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::driver::{Driver, Target};

use super::client::CdpClient;
use super::discovery::Endpoint;
use super::types::{
    AttachToTargetParams, AttachToTargetResult, EvaluateParams, EvaluateResult, GetTargetsResult,
};

/// Drives an application through its browser websocket
pub struct CdpDriver {
    client: CdpClient,
    /// Flat sessions by target id
    sessions: HashMap<String, String>,
}

impl CdpDriver {
    /// Discover the websocket of `endpoint` and attach to it
    pub async fn connect(endpoint: &Endpoint, config: &Config) -> Result<Self> {
        let attach_timeout = Duration::from_secs(config.timeouts.attach_secs);
        let request_timeout = Duration::from_secs(config.timeouts.request_secs);

        let ws_url = endpoint.websocket_url(attach_timeout).await?;
        let client = tokio::time::timeout(attach_timeout, CdpClient::connect(&ws_url, request_timeout))
            .await
            .map_err(|_| Error::connection_failed(&ws_url, "websocket handshake timed out"))??;

        Ok(Self {
            client,
            sessions: HashMap::new(),
        })
    }

    /// Drop sessions the remote reported as detached or destroyed
    fn forget_stale_sessions(&mut self) {
        for event in self.client.drain_events() {
            match event.method.as_str() {
                "Target.detachedFromTarget" => {
                    if let Some(session) = event.params.get("sessionId").and_then(Value::as_str) {
                        self.sessions.retain(|_, s| s != session);
                    }
                }
                "Target.targetDestroyed" => {
                    if let Some(target) = event.params.get("targetId").and_then(Value::as_str) {
                        self.sessions.remove(target);
                    }
                }
                _ => {}
            }
        }
    }

    async fn session_for(&mut self, target_id: &str) -> Result<String> {
        if let Some(session) = self.sessions.get(target_id) {
            return Ok(session.clone());
        }

        let params = AttachToTargetParams {
            target_id: target_id.to_string(),
            flatten: true,
        };
        let attached: AttachToTargetResult = self
            .client
            .request("Target.attachToTarget", serde_json::to_value(&params)?, None)
            .await?;

        tracing::debug!("Target {} attached as session {}", target_id, attached.session_id);
        self.sessions
            .insert(target_id.to_string(), attached.session_id.clone());
        Ok(attached.session_id)
    }
}

#[async_trait]
impl Driver for CdpDriver {
    async fn targets(&mut self) -> Result<Vec<Target>> {
        let result: GetTargetsResult = self
            .client
            .request("Target.getTargets", serde_json::json!({}), None)
            .await?;
        self.forget_stale_sessions();

        Ok(result
            .target_infos
            .into_iter()
            .filter(|info| info.is_page())
            .map(Target::from)
            .collect())
    }

    async fn evaluate(&mut self, target_id: &str, expression: &str) -> Result<Value> {
        self.forget_stale_sessions();

        let session = match self.session_for(target_id).await {
            Ok(session) => session,
            Err(Error::CdpRequestFailed { message, .. }) => {
                return Err(Error::evaluation(expression, message));
            }
            Err(e) => return Err(e),
        };

        let params = serde_json::to_value(EvaluateParams::new(expression))?;
        let evaluated: EvaluateResult = match self
            .client
            .request("Runtime.evaluate", params, Some(&session))
            .await
        {
            Ok(result) => result,
            Err(Error::CdpRequestFailed { message, .. }) => {
                self.sessions.remove(target_id);
                return Err(Error::evaluation(expression, message));
            }
            Err(e) => return Err(e),
        };

        if let Some(details) = evaluated.exception_details {
            return Err(Error::evaluation(expression, details));
        }

        Ok(evaluated.result.value.unwrap_or(Value::Null))
    }

    async fn close(&mut self) {
        self.sessions.clear();
        self.client.close().await;
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

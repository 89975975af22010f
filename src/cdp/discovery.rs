//! DevTools endpoint addressing and discovery
//!
//! An application started with a devtools port answers
//! `GET /json/version` with the websocket URL of its browser target.

use std::fmt;
use std::time::Duration;

use url::Url;

use crate::common::{Error, Result};

use super::types::VersionInfo;

/// Address of a remote debugging endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `http://host:port`, resolved through `/json/version`
    Http(Url),
    /// Browser websocket URL, used as is
    WebSocket(Url),
}

impl Endpoint {
    /// Parse `host:port`, an http(s) URL, or a ws(s) URL
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::Config("Endpoint address is empty".to_string()));
        }

        let url = if input.contains("://") {
            Url::parse(input)
        } else {
            Url::parse(&format!("http://{}", input))
        }
        .map_err(|e| Error::Config(format!("Invalid endpoint '{}': {}", input, e)))?;

        if url.host_str().is_none() {
            return Err(Error::Config(format!("Endpoint '{}' has no host", input)));
        }

        match url.scheme() {
            "http" | "https" => {
                if !input.contains("://") && !has_explicit_port(input) {
                    return Err(Error::Config(format!(
                        "Endpoint '{}' is missing a port (expected host:port)",
                        input
                    )));
                }
                Ok(Endpoint::Http(url))
            }
            "ws" | "wss" => Ok(Endpoint::WebSocket(url)),
            other => Err(Error::Config(format!(
                "Unsupported endpoint scheme '{}' in '{}'",
                other, input
            ))),
        }
    }

    /// URL of the version document, for http endpoints
    pub fn version_url(&self) -> Option<Url> {
        match self {
            Endpoint::Http(url) => url.join("/json/version").ok(),
            Endpoint::WebSocket(_) => None,
        }
    }

    /// Resolve the browser websocket URL
    pub async fn websocket_url(&self, timeout: Duration) -> Result<String> {
        let version_url = match self {
            Endpoint::WebSocket(url) => return Ok(url.to_string()),
            Endpoint::Http(_) => self
                .version_url()
                .ok_or_else(|| Error::connection_failed(&self.to_string(), "invalid version url"))?,
        };

        tracing::debug!("Discovering websocket url via {}", version_url);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::connection_failed(&self.to_string(), e))?;

        let info: VersionInfo = client
            .get(version_url)
            .send()
            .await
            .map_err(|e| Error::connection_failed(&self.to_string(), e))?
            .error_for_status()
            .map_err(|e| Error::connection_failed(&self.to_string(), e))?
            .json()
            .await
            .map_err(|e| Error::connection_failed(&self.to_string(), e))?;

        if let Some(browser) = &info.browser {
            tracing::info!("Endpoint {} reports {}", self, browser);
        }

        info.web_socket_debugger_url.ok_or_else(|| {
            Error::connection_failed(&self.to_string(), "no webSocketDebuggerUrl in /json/version")
        })
    }
}

/// Whether a bare `host:port` names its port
///
/// `Url::port` drops the scheme's default (80), so the raw text is checked.
fn has_explicit_port(input: &str) -> bool {
    let authority = input.split('/').next().unwrap_or(input);
    match authority.rsplit_once(':') {
        Some((_, port)) => !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Http(url) | Endpoint::WebSocket(url) => write!(f, "{}", url),
        }
    }
}

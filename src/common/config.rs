//! Configuration file handling

use serde::Deserialize;
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Polling settings for bounded waits
    #[serde(default)]
    pub retry: RetryConfig,

    /// Window resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,
}

/// What to do when several targets share the locator of one window
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Fail with `AmbiguousWindow`
    #[default]
    Reject,
    /// Take the first match in enumeration order
    First,
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize)]
pub struct Timeouts {
    /// Timeout for endpoint discovery and websocket handshake
    #[serde(default = "default_attach")]
    pub attach_secs: u64,

    /// Timeout for a single CDP request
    #[serde(default = "default_request")]
    pub request_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            attach_secs: default_attach(),
            request_secs: default_request(),
        }
    }
}

fn default_attach() -> u64 {
    10
}
fn default_request() -> u64 {
    30
}

/// Polling configuration
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    /// Delay between two attempts of a bounded wait
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Cap used by steps that do not set `within_ms`
    #[serde(default = "default_within")]
    pub default_within_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            default_within_ms: default_within(),
        }
    }
}

impl RetryConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_poll_interval() -> u64 {
    100
}
fn default_within() -> u64 {
    5000
}

/// Resolver configuration
#[derive(Debug, Deserialize, Default)]
pub struct ResolverConfig {
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return Self::parse(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

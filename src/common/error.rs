//! Error types for winprobe
//!
//! Errors fall in two groups: fatal ones abort the remaining scenarios of a
//! suite, the rest fail a single scenario and let the next one run.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for winprobe
#[derive(Error, Debug)]
pub enum Error {
    // === Connection Errors ===
    #[error("Failed to connect to DevTools endpoint '{endpoint}': {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("DevTools connection closed by the remote application")]
    Disconnected,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // === Window Errors ===
    #[error("Unknown window name '{0}'. Add it to the suite's `windows` table")]
    UnknownWindowName(String),

    #[error("Window '{name}' is ambiguous: {count} targets share url '{url}'")]
    AmbiguousWindow {
        name: String,
        url: String,
        count: usize,
    },

    #[error("Window '{0}' not found among current targets")]
    WindowNotFound(String),

    #[error("Expected exactly 1 context after attach, found {found}")]
    UnexpectedContextCount { found: usize },

    // === Evaluation Errors ===
    #[error("Evaluation of '{expression}' failed: {message}")]
    Evaluation { expression: String, message: String },

    // === CDP Protocol Errors ===
    #[error("CDP protocol error: {0}")]
    CdpProtocol(String),

    #[error("CDP request '{method}' failed: {message}")]
    CdpRequestFailed { method: String, message: String },

    // === Wait Errors ===
    #[error("Gave up waiting for {what} after {waited_ms}ms")]
    WaitTimeout { what: String, waited_ms: u64 },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a connection failed error
    pub fn connection_failed(endpoint: &str, reason: impl ToString) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a CDP request failed error
    pub fn cdp_request_failed(method: &str, message: &str) -> Self {
        Self::CdpRequestFailed {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an evaluation error
    pub fn evaluation(expression: &str, message: impl ToString) -> Self {
        Self::Evaluation {
            expression: expression.to_string(),
            message: message.to_string(),
        }
    }

    /// Create an assertion failure showing the expected and observed values
    pub fn mismatch(what: &str, expected: impl std::fmt::Display, observed: impl std::fmt::Display) -> Self {
        Self::TestAssertion(format!(
            "{}: expected {}, observed {}",
            what, expected, observed
        ))
    }

    /// Whether this error aborts the remaining scenarios of a suite
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed { .. }
                | Error::Disconnected
                | Error::UnknownWindowName(_)
                | Error::AmbiguousWindow { .. }
                | Error::UnexpectedContextCount { .. }
                | Error::Config(_)
                | Error::ConfigParse(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::Disconnected.is_fatal());
        assert!(Error::UnknownWindowName("main".into()).is_fatal());
        assert!(Error::UnexpectedContextCount { found: 2 }.is_fatal());
        assert!(!Error::WindowNotFound("notification".into()).is_fatal());
        assert!(!Error::evaluation("1", "boom").is_fatal());
        assert!(!Error::WaitTimeout {
            what: "window".into(),
            waited_ms: 10
        }
        .is_fatal());
    }

    #[test]
    fn test_mismatch_message() {
        let err = Error::mismatch("is_showing of 'cpuInfo'", true, false);
        assert_eq!(
            err.to_string(),
            "Test assertion failed: is_showing of 'cpuInfo': expected true, observed false"
        );
    }
}

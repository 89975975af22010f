//! CDP message types
//!
//! Only the slice of the Chrome DevTools Protocol the harness speaks.
//! See: https://chromedevtools.github.io/devtools-protocol/

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Base Protocol Messages ===

/// Outgoing method call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodCall {
    pub id: u64,
    pub method: String,
    pub params: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Response to a method call
#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

/// Error payload of a failed method call
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

impl fmt::Display for ResponseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)?;
        if let Some(data) = &self.data {
            write!(f, ": {}", data)?;
        }
        Ok(())
    }
}

/// Protocol event
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub session_id: Option<String>,
}

// === HTTP discovery ===

/// Body of `GET /json/version`
#[derive(Debug, Clone, Deserialize)]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: Option<String>,
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: Option<String>,
    #[serde(rename = "webSocketDebuggerUrl", default)]
    pub web_socket_debugger_url: Option<String>,
}

// === Target domain ===

/// `Target.TargetInfo`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attached: bool,
    #[serde(default)]
    pub browser_context_id: Option<String>,
}

impl TargetInfo {
    /// Application windows show up as `page` targets
    pub fn is_page(&self) -> bool {
        self.target_type == "page"
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetsResult {
    pub target_infos: Vec<TargetInfo>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetParams {
    pub target_id: String,
    pub flatten: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
    pub session_id: String,
}

// === Runtime domain ===

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateParams {
    pub expression: String,
    pub return_by_value: bool,
    pub await_promise: bool,
}

impl EvaluateParams {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            return_by_value: true,
            await_promise: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub result: RemoteObject,
    #[serde(default)]
    pub exception_details: Option<ExceptionDetails>,
}

/// `Runtime.RemoteObject`, by value
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type")]
    pub object_type: String,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
    pub text: String,
    #[serde(default)]
    pub line_number: i64,
    #[serde(default)]
    pub column_number: i64,
    #[serde(default)]
    pub exception: Option<RemoteObject>,
}

impl fmt::Display for ExceptionDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.exception.as_ref().and_then(|e| e.description.as_deref()) {
            Some(desc) => write!(f, "{} {}", self.text, desc),
            None => write!(
                f,
                "{} at {}:{}",
                self.text, self.line_number, self.column_number
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_call_omits_missing_session() {
        let call = MethodCall {
            id: 7,
            method: "Target.getTargets".to_string(),
            params: serde_json::json!({}),
            session_id: None,
        };
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 7, "method": "Target.getTargets", "params": {}})
        );
    }

    #[test]
    fn test_evaluate_params_return_by_value() {
        let json = serde_json::to_value(EvaluateParams::new("fin.System.getVersion()")).unwrap();
        assert_eq!(json["returnByValue"], true);
        assert_eq!(json["awaitPromise"], true);
    }

    #[test]
    fn test_target_info_from_chrome() {
        let info: TargetInfo = serde_json::from_value(serde_json::json!({
            "targetId": "A1",
            "type": "page",
            "title": "Hello OpenFin",
            "url": "http://localhost/index.html",
            "attached": false,
            "canAccessOpener": false,
            "browserContextId": "CTX"
        }))
        .unwrap();
        assert!(info.is_page());
        assert_eq!(info.browser_context_id.as_deref(), Some("CTX"));
    }

    #[test]
    fn test_exception_details_display() {
        let details: ExceptionDetails = serde_json::from_value(serde_json::json!({
            "exceptionId": 1,
            "text": "Uncaught",
            "lineNumber": 0,
            "columnNumber": 5,
            "exception": {"type": "object", "subtype": "error", "description": "ReferenceError: fin is not defined"}
        }))
        .unwrap();
        assert_eq!(
            details.to_string(),
            "Uncaught ReferenceError: fin is not defined"
        );
    }
}

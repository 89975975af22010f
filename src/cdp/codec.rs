//! CDP wire codec
//!
//! CDP frames are JSON text messages on a websocket. A frame carrying an
//! `id` answers a method call; a frame carrying only `method` is an event.

use serde_json::Value;

use crate::common::{Error, Result};

use super::types::{EventMessage, MethodCall, Response};

/// A decoded incoming frame
#[derive(Debug, Clone)]
pub enum Incoming {
    Response(Response),
    Event(EventMessage),
}

/// Decode one text frame
pub fn decode(text: &str) -> Result<Incoming> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::CdpProtocol(format!("Invalid JSON frame: {}", e)))?;

    if value.get("id").is_some() {
        let response: Response = serde_json::from_value(value)
            .map_err(|e| Error::CdpProtocol(format!("Malformed response: {}", e)))?;
        Ok(Incoming::Response(response))
    } else if value.get("method").is_some() {
        let event: EventMessage = serde_json::from_value(value)
            .map_err(|e| Error::CdpProtocol(format!("Malformed event: {}", e)))?;
        Ok(Incoming::Event(event))
    } else {
        Err(Error::CdpProtocol(format!(
            "Frame is neither response nor event: {}",
            text
        )))
    }
}

/// Encode a method call as a text frame
pub fn encode(call: &MethodCall) -> Result<String> {
    Ok(serde_json::to_string(call)?)
}

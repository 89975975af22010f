//! CDP client for communicating with a DevTools endpoint
//!
//! One websocket to the browser target. Page targets are reached through
//! flat sessions, so every call goes over the same socket and is routed by
//! its optional `sessionId`.

use std::collections::VecDeque;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::common::{Error, Result};

use super::codec::{self, Incoming};
use super::types::{EventMessage, MethodCall};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a close handshake may take before we give up on it
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// CDP client over a single browser websocket
pub struct CdpClient {
    /// Websocket to the browser target
    ws: WsStream,
    /// Identifier for the next method call
    next_id: u64,
    /// Events received while waiting for responses
    events: VecDeque<EventMessage>,
    /// Upper bound for one request/response round trip
    request_timeout: Duration,
    /// Set once the socket is known to be gone
    closed: bool,
}

impl CdpClient {
    /// Open the websocket
    pub async fn connect(ws_url: &str, request_timeout: Duration) -> Result<Self> {
        let (ws, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| Error::connection_failed(ws_url, e))?;

        tracing::info!("Attached to {}", ws_url);

        Ok(Self {
            ws,
            next_id: 1,
            events: VecDeque::new(),
            request_timeout,
            closed: false,
        })
    }

    /// Get the next call id
    fn next_call_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Send a method call and wait for its result
    ///
    /// Events that arrive meanwhile are queued, see [`CdpClient::drain_events`].
    pub async fn request<T: DeserializeOwned>(
        &mut self,
        method: &str,
        params: Value,
        session_id: Option<&str>,
    ) -> Result<T> {
        if self.closed {
            return Err(Error::Disconnected);
        }

        let id = self.next_call_id();
        let call = MethodCall {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(str::to_string),
        };

        let timeout = self.request_timeout;
        let result = tokio::time::timeout(timeout, self.round_trip(call))
            .await
            .map_err(|_| Error::Timeout(timeout.as_secs()))??;

        serde_json::from_value(result).map_err(|e| {
            Error::CdpProtocol(format!("Failed to parse {} result: {}", method, e))
        })
    }

    async fn round_trip(&mut self, call: MethodCall) -> Result<Value> {
        let json = codec::encode(&call)?;
        tracing::debug!("CDP >>> {}", json);

        if let Err(e) = self.ws.send(Message::Text(json.into())).await {
            tracing::debug!("CDP send failed: {}", e);
            self.closed = true;
            return Err(Error::Disconnected);
        }

        loop {
            match self.read_message().await? {
                Incoming::Response(response) if response.id == call.id => {
                    if let Some(error) = response.error {
                        return Err(Error::cdp_request_failed(&call.method, &error.to_string()));
                    }
                    return Ok(response.result.unwrap_or(Value::Null));
                }
                Incoming::Response(response) => {
                    tracing::warn!("Dropping response to unknown call {}", response.id);
                }
                Incoming::Event(event) => self.events.push_back(event),
            }
        }
    }

    /// Read the next protocol frame
    async fn read_message(&mut self) -> Result<Incoming> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    tracing::trace!("CDP <<< {}", text.as_str());
                    return codec::decode(text.as_str());
                }
                Some(Ok(Message::Close(_))) | None => {
                    self.closed = true;
                    return Err(Error::Disconnected);
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    tracing::debug!("CDP socket error: {}", e);
                    self.closed = true;
                    return Err(Error::Disconnected);
                }
            }
        }
    }

    /// Take the events queued since the last call
    pub fn drain_events(&mut self) -> Vec<EventMessage> {
        self.events.drain(..).collect()
    }

    /// Close the websocket
    ///
    /// Safe to call repeatedly and after the remote has gone away.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        match tokio::time::timeout(CLOSE_GRACE, SinkExt::close(&mut self.ws)).await {
            Ok(Ok(())) => tracing::debug!("CDP socket closed"),
            Ok(Err(e)) => tracing::debug!("Ignoring close error: {}", e),
            Err(_) => tracing::debug!("Close handshake timed out"),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

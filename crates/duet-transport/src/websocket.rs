//! WebSocket sessions over tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::address::ServerAddress;
use crate::error::{TransportError, TransportResult};
use crate::transport::{Connector, Transport};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketOptions {
    pub connect_timeout_ms: u64,
    /// Per-receive deadline. `None` waits indefinitely, which live
    /// subscriptions rely on.
    pub read_timeout_ms: Option<u64>,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            read_timeout_ms: None,
        }
    }
}

pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
    read_timeout: Option<Duration>,
}

impl WebSocketTransport {
    pub async fn connect(address: &ServerAddress, options: &WebSocketOptions) -> TransportResult<Self> {
        let url = address.url();
        let unreachable = |reason: String| TransportError::Unreachable {
            address: url.clone(),
            reason,
        };
        let (stream, response) = timeout(
            Duration::from_millis(options.connect_timeout_ms),
            connect_async(url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Timeout(format!("connecting to {url}")))?
        .map_err(|e| unreachable(e.to_string()))?;
        debug!(%url, status = %response.status(), "websocket connected");
        Ok(Self {
            stream,
            url,
            read_timeout: options.read_timeout_ms.map(Duration::from_millis),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn next_frame(&mut self) -> TransportResult<Message> {
        let next = match self.read_timeout {
            Some(limit) => timeout(limit, self.stream.next())
                .await
                .map_err(|_| TransportError::Timeout(format!("reading from {}", self.url)))?,
            None => self.stream.next().await,
        };
        next.ok_or(TransportError::ConnectionClosed)?
            .map_err(map_ws_error)
    }
}

fn map_ws_error(err: WsError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
        WsError::Io(e) => TransportError::Protocol(format!("io: {e}")),
        other => TransportError::Protocol(other.to_string()),
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, request: &Value) -> TransportResult<()> {
        self.stream
            .send(Message::Text(request.to_string()))
            .await
            .map_err(map_ws_error)
    }

    async fn receive(&mut self) -> TransportResult<Value> {
        loop {
            match self.next_frame().await? {
                Message::Text(text) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| TransportError::Decode(e.to_string()))
                }
                Message::Binary(data) => {
                    return serde_json::from_slice(&data)
                        .map_err(|e| TransportError::Decode(e.to_string()))
                }
                Message::Ping(data) => {
                    self.stream
                        .send(Message::Pong(data))
                        .await
                        .map_err(map_ws_error)?;
                }
                Message::Pong(_) | Message::Frame(_) => {}
                Message::Close(_) => return Err(TransportError::ConnectionClosed),
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    address: ServerAddress,
    options: WebSocketOptions,
}

impl WebSocketConnector {
    pub fn new(address: ServerAddress, options: WebSocketOptions) -> Self {
        Self { address, options }
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Session = WebSocketTransport;

    async fn connect(&self) -> TransportResult<WebSocketTransport> {
        WebSocketTransport::connect(&self.address, &self.options).await
    }

    fn describe(&self) -> String {
        self.address.url()
    }
}

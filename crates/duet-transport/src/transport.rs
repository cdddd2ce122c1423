use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportResult;

/// One open session to a server.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, request: &Value) -> TransportResult<()>;

    /// Next message from the server, response or unsolicited event.
    async fn receive(&mut self) -> TransportResult<Value>;

    async fn close(&mut self) -> TransportResult<()>;

    /// Send one request and take the next message as its response.
    async fn request(&mut self, request: &Value) -> TransportResult<Value> {
        self.send(request).await?;
        self.receive().await
    }
}

/// Opens fresh sessions against one server.
#[async_trait]
pub trait Connector: Send + Sync {
    type Session: Transport + 'static;

    async fn connect(&self) -> TransportResult<Self::Session>;

    /// Human-readable target, for logs and reports.
    fn describe(&self) -> String;
}

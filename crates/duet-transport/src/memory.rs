//! Scripted in-memory sessions.
//!
//! A [`MemoryTransport`] answers each request through a handler closure and
//! can additionally deliver unsolicited events fed through a channel. Every
//! request is appended to a shared [`RequestLog`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{TransportError, TransportResult};
use crate::transport::{Connector, Transport};

type Handler = Box<dyn FnMut(&Value) -> TransportResult<Vec<Value>> + Send>;
type Factory = Arc<dyn Fn() -> TransportResult<MemoryTransport> + Send + Sync>;

/// Append-only record of requests sent through one or more sessions.
#[derive(Clone, Debug, Default)]
pub struct RequestLog {
    inner: Arc<Mutex<Vec<Value>>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, request: Value) {
        self.inner.lock().expect("request log poisoned").push(request);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("request log poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.inner.lock().expect("request log poisoned").clone()
    }
}

pub struct MemoryTransport {
    handler: Handler,
    inbox: VecDeque<Value>,
    events: Option<mpsc::UnboundedReceiver<Value>>,
    latency: Duration,
    log: RequestLog,
    closed: bool,
}

impl MemoryTransport {
    /// A session whose handler returns the messages to deliver for each request.
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(&Value) -> TransportResult<Vec<Value>> + Send + 'static,
    {
        Self {
            handler: Box::new(handler),
            inbox: VecDeque::new(),
            events: None,
            latency: Duration::ZERO,
            log: RequestLog::new(),
            closed: false,
        }
    }

    /// A session that answers every request with exactly one response.
    pub fn responder<F>(mut respond: F) -> Self
    where
        F: FnMut(&Value) -> Value + Send + 'static,
    {
        Self::new(move |req| Ok(vec![respond(req)]))
    }

    /// Delay applied to every request before its responses are queued.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Deliver values from `events` once queued responses are exhausted.
    /// The session reports `ConnectionClosed` when the sender is dropped.
    pub fn with_events(mut self, events: mpsc::UnboundedReceiver<Value>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_log(mut self, log: RequestLog) -> Self {
        self.log = log;
        self
    }

    pub fn request_log(&self) -> RequestLog {
        self.log.clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, request: &Value) -> TransportResult<()> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        self.log.push(request.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let replies = (self.handler)(request)?;
        self.inbox.extend(replies);
        Ok(())
    }

    async fn receive(&mut self) -> TransportResult<Value> {
        if self.closed {
            return Err(TransportError::ConnectionClosed);
        }
        if let Some(message) = self.inbox.pop_front() {
            return Ok(message);
        }
        match self.events.as_mut() {
            Some(events) => events.recv().await.ok_or(TransportError::ConnectionClosed),
            None => Err(TransportError::ConnectionClosed),
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        self.closed = true;
        self.inbox.clear();
        Ok(())
    }
}

/// Hands out a fresh [`MemoryTransport`] per `connect`.
#[derive(Clone)]
pub struct MemoryConnector {
    factory: Factory,
    name: String,
}

impl MemoryConnector {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> TransportResult<MemoryTransport> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            name: name.into(),
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Session = MemoryTransport;

    async fn connect(&self) -> TransportResult<MemoryTransport> {
        (self.factory)()
    }

    fn describe(&self) -> String {
        format!("memory://{}", self.name)
    }
}

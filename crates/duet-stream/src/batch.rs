use serde_json::Value;

use crate::options::StreamOptions;

/// Events buffered on one side until its boundary arrives.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LiveBatch {
    pub events: Vec<Value>,
    pub boundary: Option<Value>,
}

impl LiveBatch {
    pub fn push(&mut self, event: Value) {
        self.events.push(event);
    }

    pub fn boundary_seen(&self) -> bool {
        self.boundary.is_some()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Ledger the boundary closed, when it says.
    pub fn ledger_index(&self) -> Option<u32> {
        self.boundary
            .as_ref()?
            .get("ledger_index")?
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
    }

    /// Hand off the buffered events closed by `boundary`, leaving this batch
    /// empty.
    pub fn seal(&mut self, boundary: Value) -> LiveBatch {
        LiveBatch {
            events: std::mem::take(&mut self.events),
            boundary: Some(boundary),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventClass {
    Item,
    Boundary,
    /// Responses and event types nobody asked to compare.
    Ignored,
}

/// Classifies stream messages by their `type` field.
#[derive(Clone, Debug)]
pub struct EventFilter {
    event_types: Vec<String>,
    boundary_type: String,
}

impl EventFilter {
    pub fn new(options: &StreamOptions) -> Self {
        Self {
            event_types: options.event_types.clone(),
            boundary_type: options.boundary_type.clone(),
        }
    }

    pub fn classify(&self, message: &Value) -> EventClass {
        match message.get("type").and_then(Value::as_str) {
            Some(t) if t == self.boundary_type => EventClass::Boundary,
            Some(t) if self.event_types.iter().any(|e| e == t) => EventClass::Item,
            _ => EventClass::Ignored,
        }
    }
}

//! Envelope Normalizer.
//!
//! Servers answer either `{"result": {...}}` or the bare object, and spell
//! the continuation `"cursor"` or `"marker"`. [`normalize`] hides both
//! conventions behind one [`Envelope`].

use duet_types::Cursor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::endpoint::{EndpointDescriptor, PayloadShape};
use crate::error::{ProtocolError, ProtocolResult};

const WRAPPER: &str = "result";
const CURSOR_FIELDS: [&str; 2] = ["cursor", "marker"];

/// An explicit error reported by the server inside an otherwise valid payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFault {
    pub error: String,
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl std::fmt::Display for ServerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.error)?;
        if let Some(code) = self.code {
            write!(f, " ({code})")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// One normalized response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    /// Raw item records in response order.
    pub items: Vec<Value>,
    /// Where the next page resumes. `None` means the walk is finished.
    pub continuation: Option<Cursor>,
    pub error: Option<ServerFault>,
}

impl Envelope {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// The payload inside a `"result"` wrapper, or the payload itself.
pub fn unwrap_result(payload: &Value) -> &Value {
    match payload.get(WRAPPER) {
        Some(inner @ Value::Object(_)) => inner,
        _ => payload,
    }
}

/// Whether either level of the payload carries an error indicator.
pub fn is_error_response(payload: &Value) -> bool {
    payload
        .as_object()
        .map(|outer| fault(outer).is_some())
        .unwrap_or(false)
}

/// Interpret one response for `descriptor`.
pub fn normalize(descriptor: &EndpointDescriptor, payload: &Value) -> ProtocolResult<Envelope> {
    let outer = payload.as_object().ok_or_else(|| {
        ProtocolError::MalformedEnvelope(format!(
            "{} response is not an object",
            descriptor.command
        ))
    })?;

    if let Some(error) = fault(outer) {
        tracing::debug!(command = descriptor.command, %error, "server reported error");
        return Ok(Envelope {
            items: Vec::new(),
            continuation: None,
            error: Some(error),
        });
    }

    let inner = inner_object(outer).unwrap_or(outer);
    let items = extract_items(descriptor.payload, inner);
    let continuation = continuation(inner, outer)?;

    if items.is_none() && continuation.is_none() {
        return Err(ProtocolError::MalformedEnvelope(format!(
            "{} response has neither items nor continuation",
            descriptor.command
        )));
    }

    Ok(Envelope {
        items: items.unwrap_or_default(),
        continuation,
        error: None,
    })
}

fn inner_object(outer: &Map<String, Value>) -> Option<&Map<String, Value>> {
    outer.get(WRAPPER).and_then(Value::as_object)
}

/// Wrapped level first, then the outer level.
fn fault(outer: &Map<String, Value>) -> Option<ServerFault> {
    inner_object(outer)
        .and_then(fault_at)
        .or_else(|| fault_at(outer))
}

fn fault_at(level: &Map<String, Value>) -> Option<ServerFault> {
    let flagged = level.get("status").and_then(Value::as_str) == Some("error");
    let error = match level.get("error") {
        Some(Value::Null) | None if !flagged => return None,
        Some(Value::Null) | None => "error".to_owned(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    Some(ServerFault {
        error,
        code: level.get("error_code").and_then(Value::as_i64),
        message: level
            .get("error_message")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

fn lookup<'a>(level: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = level.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

fn extract_items(shape: PayloadShape, level: &Map<String, Value>) -> Option<Vec<Value>> {
    match shape {
        PayloadShape::List(paths) => paths
            .iter()
            .find_map(|p| lookup(level, p).and_then(Value::as_array))
            .cloned(),
        PayloadShape::Object(paths) => paths
            .iter()
            .find_map(|p| lookup(level, p).filter(|v| v.is_object()))
            .map(|v| vec![v.clone()]),
        PayloadShape::Whole => Some(vec![Value::Object(level.clone())]),
    }
}

/// Inner `cursor`, inner `marker`, outer `cursor`, outer `marker`; the first
/// non-null value wins.
fn continuation(
    inner: &Map<String, Value>,
    outer: &Map<String, Value>,
) -> ProtocolResult<Option<Cursor>> {
    let found = [inner, outer]
        .into_iter()
        .flat_map(|level| CURSOR_FIELDS.iter().filter_map(move |f| level.get(*f)))
        .find(|v| !v.is_null());
    match found {
        Some(value) => Cursor::from_wire(value)
            .map(Some)
            .map_err(|e| ProtocolError::MalformedEnvelope(e.to_string())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointKind;
    use serde_json::json;

    fn history() -> &'static EndpointDescriptor {
        EndpointKind::TransactionHistory.descriptor()
    }

    #[test]
    fn wrapped_and_bare_payloads_agree() {
        let bare = json!({"transactions": [{"tx": "A"}], "marker": {"ledger": 5, "seq": 2}});
        let wrapped = json!({"result": bare.clone()});
        let a = normalize(history(), &bare).unwrap();
        let b = normalize(history(), &wrapped).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.items.len(), 1);
        assert_eq!(a.continuation, Some(Cursor::position(5, 2)));
    }

    #[test]
    fn cursor_spelling_wins_over_marker() {
        let payload = json!({"result": {
            "transactions": [],
            "cursor": {"ledger_sequence": 9, "transaction_index": 1},
            "marker": {"ledger": 1, "seq": 1},
        }});
        let env = normalize(history(), &payload).unwrap();
        assert_eq!(env.continuation, Some(Cursor::position(9, 1)));
    }

    #[test]
    fn outer_marker_used_when_inner_has_none() {
        let payload = json!({"result": {"state": [{"index": "K"}]}, "marker": "NEXT"});
        let env = normalize(EndpointKind::LedgerObjectScan.descriptor(), &payload).unwrap();
        assert_eq!(env.continuation, Some(Cursor::opaque("NEXT")));
        assert_eq!(env.items, vec![json!({"index": "K"})]);
    }

    #[test]
    fn absent_continuation_is_termination() {
        let payload = json!({"result": {"offers": [{"index": "1"}, {"index": "2"}]}});
        let env = normalize(EndpointKind::OrderBookScan.descriptor(), &payload).unwrap();
        assert_eq!(env.items.len(), 2);
        assert_eq!(env.continuation, None);
        assert!(!env.is_error());
    }

    #[test]
    fn error_indicator_yields_no_items() {
        let payload = json!({"result": {
            "error": "lgrNotFound",
            "error_code": 21,
            "error_message": "ledgerNotFound",
            "transactions": [{"tx": "A"}],
        }});
        let env = normalize(history(), &payload).unwrap();
        assert!(env.is_error());
        assert!(env.items.is_empty());
        let fault = env.error.unwrap();
        assert_eq!(fault.error, "lgrNotFound");
        assert_eq!(fault.code, Some(21));
        assert!(is_error_response(&payload));
    }

    #[test]
    fn status_error_without_error_field() {
        let payload = json!({"status": "error", "type": "response"});
        let env = normalize(history(), &payload).unwrap();
        assert_eq!(env.error.map(|f| f.error), Some("error".to_owned()));
    }

    #[test]
    fn malformed_when_nothing_recognisable() {
        let err = normalize(history(), &json!({"result": {"status": "success"}})).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedEnvelope(_)));
        assert!(normalize(history(), &json!([1, 2])).is_err());
        let bad_cursor = json!({"transactions": [], "marker": true});
        assert!(matches!(
            normalize(history(), &bad_cursor),
            Err(ProtocolError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn object_and_whole_shapes() {
        let payload = json!({"result": {"account_data": {"Account": "rA", "Balance": "10"}}});
        let env = normalize(EndpointKind::AccountSnapshot.descriptor(), &payload).unwrap();
        assert_eq!(env.items, vec![json!({"Account": "rA", "Balance": "10"})]);

        let payload = json!({"result": {"transaction": "AB", "meta": "CD", "ledger_index": 7}});
        let env = normalize(EndpointKind::TransactionByHash.descriptor(), &payload).unwrap();
        assert_eq!(env.items[0]["ledger_index"], json!(7));
    }

    #[test]
    fn dotted_path_for_ledger_transactions() {
        let payload = json!({"result": {"ledger": {"transactions": ["T1", "T2"]}}});
        let env = normalize(EndpointKind::Ledger.descriptor(), &payload).unwrap();
        assert_eq!(env.items, vec![json!("T1"), json!("T2")]);
    }

    #[test]
    fn unwrap_result_passthrough() {
        let bare = json!({"info": {}});
        assert_eq!(unwrap_result(&bare), &bare);
        let wrapped = json!({"result": {"info": {}}});
        assert_eq!(unwrap_result(&wrapped), &bare);
    }
}

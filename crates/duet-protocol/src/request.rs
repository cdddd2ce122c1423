use duet_types::Cursor;
use serde_json::{Map, Value};

use crate::endpoint::{EndpointDescriptor, EndpointKind};
use crate::error::{ProtocolError, ProtocolResult};

/// Builds requests for one endpoint from a fixed parameter set.
///
/// The same builder is reused for every page of a crawl; only the cursor
/// changes between pages.
#[derive(Clone, Debug)]
pub struct RequestBuilder {
    descriptor: &'static EndpointDescriptor,
    params: Map<String, Value>,
}

impl RequestBuilder {
    pub fn new(kind: EndpointKind) -> Self {
        Self {
            descriptor: kind.descriptor(),
            params: Map::new(),
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Merge a parameter object. Non-object values are ignored.
    pub fn params(mut self, params: &Value) -> Self {
        if let Some(map) = params.as_object() {
            for (k, v) in map {
                self.params.insert(k.clone(), v.clone());
            }
        }
        self
    }

    pub fn descriptor(&self) -> &'static EndpointDescriptor {
        self.descriptor
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    /// The numeric `ledger_index` parameter, when the request pins one ledger.
    pub fn pinned_ledger(&self) -> Option<u32> {
        self.params
            .get("ledger_index")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    /// Produce one request, attaching the page-size limit and the cursor in
    /// both accepted spellings.
    pub fn build(&self, cursor: Option<&Cursor>, limit: Option<u32>) -> ProtocolResult<Value> {
        for param in self.descriptor.required {
            if !self.params.contains_key(*param) {
                return Err(ProtocolError::MissingParameter {
                    command: self.descriptor.command,
                    param: *param,
                });
            }
        }
        let mut request = Map::with_capacity(self.params.len() + 4);
        request.insert("command".into(), Value::String(self.descriptor.command.into()));
        for (k, v) in &self.params {
            request.insert(k.clone(), v.clone());
        }
        if let Some(limit) = limit {
            request.insert("limit".into(), Value::from(limit));
        }
        if let Some(cursor) = cursor {
            request.insert("cursor".into(), cursor.cursor_value());
            request.insert("marker".into(), cursor.marker_value());
        }
        Ok(Value::Object(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_page_has_no_cursor() {
        let req = RequestBuilder::new(EndpointKind::TransactionHistory)
            .param("account", "rAlice")
            .param("binary", true)
            .build(None, Some(200))
            .unwrap();
        assert_eq!(
            req,
            json!({"command": "account_tx", "account": "rAlice", "binary": true, "limit": 200})
        );
    }

    #[test]
    fn cursor_attached_in_both_spellings() {
        let builder = RequestBuilder::new(EndpointKind::TransactionHistory).param("account", "rA");
        let req = builder.build(Some(&Cursor::position(9, 4)), None).unwrap();
        assert_eq!(req["cursor"], json!({"ledger_sequence": 9, "transaction_index": 4}));
        assert_eq!(req["marker"], json!({"ledger": 9, "seq": 4}));

        let req = RequestBuilder::new(EndpointKind::LedgerObjectScan)
            .param("ledger_index", 5)
            .build(Some(&Cursor::opaque("AB")), Some(2048))
            .unwrap();
        assert_eq!(req["cursor"], json!("AB"));
        assert_eq!(req["marker"], json!("AB"));
    }

    #[test]
    fn missing_required_parameter() {
        let err = RequestBuilder::new(EndpointKind::OrderBookScan)
            .param("taker_pays", json!({"currency": "XRP"}))
            .build(None, None)
            .unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingParameter { command: "book_offers", param: "taker_gets" }
        );
    }

    #[test]
    fn params_merge_and_pinned_ledger() {
        let builder = RequestBuilder::new(EndpointKind::Ledger)
            .params(&json!({"ledger_index": 321, "transactions": true}));
        assert_eq!(builder.pinned_ledger(), Some(321));
        assert_eq!(builder.get("transactions"), Some(&json!(true)));
        let builder = RequestBuilder::new(EndpointKind::Ledger).param("ledger_index", "validated");
        assert_eq!(builder.pinned_ledger(), None);
    }
}

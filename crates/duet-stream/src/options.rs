use duet_protocol::{EndpointKind, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamOptions {
    /// Stream names sent in the subscription request.
    pub streams: Vec<String>,
    pub accounts: Vec<String>,
    /// Order book descriptors, passed through verbatim.
    pub books: Vec<Value>,
    /// Event `type`s buffered into batches.
    pub event_types: Vec<String>,
    /// Event `type` that closes a batch.
    pub boundary_type: String,
    /// JSON pointer to each event's identity.
    pub identity_pointer: String,
    /// Acknowledgement fields ignored when comparing the two acks.
    pub ack_volatile_fields: Vec<String>,
    /// Event fields ignored when comparing batches.
    pub event_volatile_fields: Vec<String>,
    pub batch_timeout_ms: u64,
    pub ack_timeout_ms: u64,
    /// Stop after this many matched batches. `None` runs until cancelled.
    pub max_batches: Option<usize>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            streams: vec!["ledger".into(), "transactions".into()],
            accounts: Vec::new(),
            books: Vec::new(),
            event_types: vec!["transaction".into()],
            boundary_type: "ledgerClosed".into(),
            identity_pointer: "/transaction/hash".into(),
            ack_volatile_fields: vec!["validated_ledgers".into()],
            event_volatile_fields: Vec::new(),
            batch_timeout_ms: 30_000,
            ack_timeout_ms: 10_000,
            max_batches: None,
        }
    }
}

impl StreamOptions {
    /// The identical request sent to both servers.
    pub fn subscription(&self) -> RequestBuilder {
        let mut request = RequestBuilder::new(EndpointKind::LedgerClosedSubscription)
            .param("streams", self.streams.clone());
        if !self.accounts.is_empty() {
            request = request.param("accounts", self.accounts.clone());
        }
        if !self.books.is_empty() {
            request = request.param("books", self.books.clone());
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subscription_request_shape() {
        let options = StreamOptions {
            accounts: vec!["rA".into()],
            ..StreamOptions::default()
        };
        let req = options.subscription().build(None, None).unwrap();
        assert_eq!(
            req,
            json!({"command": "subscribe", "streams": ["ledger", "transactions"], "accounts": ["rA"]})
        );
    }

    #[test]
    fn books_passed_through_verbatim() {
        let book = json!({"taker_pays": {"currency": "XRP"}, "taker_gets": {"currency": "USD", "issuer": "rI"}, "snapshot": false});
        let options = StreamOptions {
            streams: vec!["transactions".into()],
            books: vec![book.clone()],
            ..StreamOptions::default()
        };
        let req = options.subscription().build(None, None).unwrap();
        assert_eq!(req["books"], json!([book]));
        assert!(req.get("accounts").is_none());
    }

    #[test]
    fn partial_config() {
        let options: StreamOptions = serde_json::from_value(json!({"max_batches": 3})).unwrap();
        assert_eq!(options.max_batches, Some(3));
        assert_eq!(options.boundary_type, "ledgerClosed");
    }
}

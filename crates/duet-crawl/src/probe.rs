//! Ledger range discovery.
//!
//! Servers advertise the ledgers they hold either through `ledger_range`
//! or, when that command is unsupported, through the `complete_ledgers`
//! string of `server_info`.

use duet_protocol::{is_error_response, normalize, unwrap_result, EndpointKind, RequestBuilder};
use duet_transport::Transport;
use duet_types::{LedgerRange, TypeError};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{CrawlError, CrawlResult};

/// The validated range the server holds, or `None` when it holds nothing.
pub async fn ledger_range<T: Transport + ?Sized>(transport: &mut T) -> CrawlResult<Option<LedgerRange>> {
    let request = RequestBuilder::new(EndpointKind::LedgerRange).build(None, None)?;
    let response = transport.request(&request).await?;
    if !is_error_response(&response) {
        return range_from_bounds(unwrap_result(&response)).map(Some);
    }

    debug!("ledger_range unsupported, falling back to server_info");
    let request = RequestBuilder::new(EndpointKind::ServerInfo).build(None, None)?;
    let response = transport.request(&request).await?;
    let envelope = normalize(EndpointKind::ServerInfo.descriptor(), &response)?;
    if let Some(fault) = envelope.error {
        return Err(CrawlError::ServerError { attempts: 1, fault });
    }
    let complete = envelope
        .items
        .first()
        .and_then(|info| info.get("complete_ledgers"))
        .and_then(Value::as_str)
        .ok_or_else(|| TypeError::MissingField("info.complete_ledgers".into()))?;
    parse_complete_ledgers(complete)
}

fn range_from_bounds(result: &Value) -> CrawlResult<LedgerRange> {
    let bound = |name: &str| {
        result
            .get(name)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| TypeError::MissingField(name.into()))
    };
    Ok(LedgerRange::new(bound("ledger_index_min")?, bound("ledger_index_max")?)?)
}

/// `"a-b"`, `"a-b,c-d"` (first range wins), or `"empty"`.
pub fn parse_complete_ledgers(text: &str) -> CrawlResult<Option<LedgerRange>> {
    let text = text.trim();
    if text.is_empty() || text == "empty" {
        return Ok(None);
    }
    let first = text.split(',').next().unwrap_or(text);
    Ok(Some(first.parse()?))
}

/// Ledgers in `range` (inclusive) that the server reports an error for.
pub async fn find_gaps<T: Transport + ?Sized>(transport: &mut T, range: LedgerRange) -> CrawlResult<Vec<u32>> {
    let base = RequestBuilder::new(EndpointKind::Ledger)
        .params(&json!({"binary": true, "transactions": false, "expand": false}));
    let mut missing = Vec::new();
    for seq in range.iter() {
        let request = base.clone().param("ledger_index", seq).build(None, None)?;
        let response = transport.request(&request).await?;
        if is_error_response(&response) {
            debug!(ledger = seq, "ledger missing");
            missing.push(seq);
        }
    }
    info!(%range, missing = missing.len(), "gap scan done");
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use duet_transport::MemoryTransport;

    #[tokio::test]
    async fn range_from_ledger_range_command() {
        let mut t = MemoryTransport::responder(|_| {
            json!({"result": {"ledger_index_min": 32570, "ledger_index_max": 32600}})
        });
        assert_eq!(ledger_range(&mut t).await.unwrap(), Some(LedgerRange { min: 32570, max: 32600 }));
    }

    #[tokio::test]
    async fn falls_back_to_server_info() {
        let mut t = MemoryTransport::responder(|req| match req["command"].as_str() {
            Some("ledger_range") => json!({"error": "unknownCmd"}),
            _ => json!({"result": {"info": {"complete_ledgers": "10-20,25-30"}}}),
        });
        assert_eq!(ledger_range(&mut t).await.unwrap(), Some(LedgerRange { min: 10, max: 20 }));
        assert_eq!(t.request_log().len(), 2);
    }

    #[test]
    fn empty_complete_ledgers() {
        assert_eq!(parse_complete_ledgers("empty").unwrap(), None);
        assert_eq!(parse_complete_ledgers("7").unwrap(), Some(LedgerRange::single(7)));
        assert!(parse_complete_ledgers("x-y").is_err());
    }

    #[tokio::test]
    async fn gaps_are_error_ledgers() {
        let mut t = MemoryTransport::responder(|req| match req["ledger_index"].as_u64() {
            Some(12) | Some(14) => json!({"result": {"error": "lgrNotFound"}}),
            _ => json!({"result": {"ledger": {"ledger_index": req["ledger_index"]}}}),
        });
        let gaps = find_gaps(&mut t, LedgerRange { min: 10, max: 15 }).await.unwrap();
        assert_eq!(gaps, vec![12, 14]);
        assert_eq!(t.request_log().len(), 6);
    }
}

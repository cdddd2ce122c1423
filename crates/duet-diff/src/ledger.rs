//! Whole-ledger comparison: header plus transaction multiset.

use duet_types::{AggregateResult, Item, RecordKind};
use serde_json::Value;
use tracing::debug;

use crate::error::{DiffError, DiffResult};
use crate::report::{ReconciliationReport, ReportBuilder, ReportOptions};
use crate::structural::compare_values;
use crate::tuples::tuples_into;

/// Compare two `ledger` responses (already unwrapped from `"result"`).
///
/// Headers are compared by their binary blob when both sides provide one,
/// structurally otherwise. Transactions are compared as a multiset.
pub fn compare_ledgers(source: &Value, target: &Value, options: &ReportOptions) -> DiffResult<ReconciliationReport> {
    let mut report = ReportBuilder::new(options);

    let source_header = header(source).ok_or(DiffError::MissingSection { side: "source", section: "ledger header" })?;
    let target_header = header(target).ok_or(DiffError::MissingSection { side: "target", section: "ledger header" })?;
    let mut path = vec!["header".to_owned()];
    let before = report.findings();
    compare_values(&mut report, &mut path, &source_header, &target_header, options);
    if report.findings() == before {
        report.matched(1);
    }

    let left = transactions(source, "source")?;
    let right = transactions(target, "target")?;
    tuples_into(&mut report, &left, &right, options);

    let report = report.finish();
    debug!(verdict = %report.verdict, tx = left.len(), "ledger compare");
    Ok(report)
}

/// `header.blob`, `ledger.ledger_data`, or the `ledger` object without its
/// transaction list.
fn header(payload: &Value) -> Option<Value> {
    if let Some(blob) = payload.pointer("/header/blob").or_else(|| payload.pointer("/ledger/ledger_data")) {
        return Some(blob.clone());
    }
    let mut object = payload.get("ledger").or_else(|| payload.get("header"))?.as_object()?.clone();
    object.remove("transactions");
    Some(Value::Object(object))
}

fn transactions(payload: &Value, side: &'static str) -> DiffResult<AggregateResult> {
    let records = payload
        .get("transactions")
        .or_else(|| payload.pointer("/ledger/transactions"))
        .and_then(Value::as_array)
        .ok_or(DiffError::MissingSection { side, section: "transaction list" })?;
    let ledger = ledger_sequence(payload);
    let items = records
        .iter()
        .map(|record| Item::from_record_at(RecordKind::Transaction, record, ledger))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(AggregateResult::from_items(items))
}

fn ledger_sequence(payload: &Value) -> Option<u32> {
    ["/ledger_index", "/ledger/ledger_index", "/header/ledger_sequence"]
        .iter()
        .filter_map(|p| payload.pointer(p))
        .find_map(|v| match v {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
        .and_then(|n| u32::try_from(n).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MismatchKind;
    use serde_json::json;

    fn candidate(header: &str, txs: &[(&str, &str)]) -> Value {
        let txs: Vec<Value> = txs.iter().map(|(t, m)| json!({"transaction": t, "metadata": m})).collect();
        json!({"ledger_index": 70, "header": {"blob": header}, "transactions": txs})
    }

    fn reference(header: &str, txs: &[(&str, &str)]) -> Value {
        let txs: Vec<Value> = txs.iter().map(|(t, m)| json!({"tx_blob": t, "meta": m})).collect();
        json!({"ledger_index": 70, "ledger": {"ledger_data": header, "transactions": txs}})
    }

    #[test]
    fn dialects_agree() {
        let report = compare_ledgers(
            &candidate("HDR", &[("T1", "M1"), ("T2", "M2")]),
            &reference("HDR", &[("T2", "M2"), ("T1", "M1")]),
            &ReportOptions::default(),
        )
        .unwrap();
        assert!(report.is_match(), "{:?}", report.mismatches);
        assert_eq!(report.matched_count, 3);
    }

    #[test]
    fn header_and_transaction_differences_merge() {
        let report = compare_ledgers(
            &candidate("HDR1", &[("T1", "M1")]),
            &reference("HDR2", &[("T1", "MX")]),
            &ReportOptions::default(),
        )
        .unwrap();
        assert_eq!(report.count_of(MismatchKind::FieldDiffers), 1);
        assert_eq!(report.mismatches[0].path_string(), "header");
        assert_eq!(report.left_only_count, 1);
        assert_eq!(report.right_only_count, 1);
    }

    #[test]
    fn missing_transactions_is_an_error() {
        let err = compare_ledgers(&json!({"header": {"blob": "H"}}), &reference("H", &[]), &ReportOptions::default())
            .unwrap_err();
        assert_eq!(err, DiffError::MissingSection { side: "source", section: "transaction list" });
    }
}

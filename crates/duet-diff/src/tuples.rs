//! Multiset-of-tuples comparison.
//!
//! Two crawls taken a moment apart rarely cover the same ledgers. Items
//! outside the overlapping window are dropped before comparing, so range
//! skew does not show up as divergence.

use std::cmp::Ordering;

use duet_types::{AggregateResult, IdentityTuple, Item, LedgerRange};
use serde_json::Value;
use tracing::{debug, warn};

use crate::report::{
    MismatchDetail, MismatchKind, ReconciliationReport, ReportBuilder, ReportOptions, Side,
};

/// Flag ledger objects whose key is not exactly 64 hex characters.
pub fn check_object_keys(result: &AggregateResult, side: Side) -> Vec<MismatchDetail> {
    result
        .items()
        .iter()
        .filter_map(|item| match item {
            Item::LedgerObject(object) if !object.has_valid_key() => Some(object),
            _ => None,
        })
        .map(|object| {
            warn!(%side, key = %object.key, "malformed ledger object key");
            let key = Some(Value::String(object.key.clone()));
            let (source_value, target_value) = match side {
                Side::Source => (key, None),
                Side::Target => (None, key),
            };
            MismatchDetail::new(
                MismatchKind::IntegrityViolation,
                vec![side.as_str().to_owned(), "key".to_owned()],
                source_value,
                target_value,
            )
        })
        .collect()
}

/// Compare two results as multisets of identity tuples.
pub fn compare_tuples(
    left: &AggregateResult,
    right: &AggregateResult,
    options: &ReportOptions,
) -> ReconciliationReport {
    let mut report = ReportBuilder::new(options);
    tuples_into(&mut report, left, right, options);
    let report = report.finish();
    debug!(
        verdict = %report.verdict,
        matched = report.matched_count,
        left_only = report.left_only_count,
        right_only = report.right_only_count,
        "tuple compare"
    );
    report
}

pub(crate) fn tuples_into(
    report: &mut ReportBuilder,
    left: &AggregateResult,
    right: &AggregateResult,
    options: &ReportOptions,
) {
    for detail in check_object_keys(left, Side::Source)
        .into_iter()
        .chain(check_object_keys(right, Side::Target))
    {
        report.push(detail);
    }

    let window = comparison_window(left.coverage(), right.coverage());
    let lhs = project(left, window, options);
    let rhs = project(right, window, options);

    if lhs.len() != rhs.len() {
        report.push(MismatchDetail::new(
            MismatchKind::LengthMismatch,
            vec!["items".to_owned()],
            Some(Value::from(lhs.len())),
            Some(Value::from(rhs.len())),
        ));
    }

    let (mut i, mut j) = (0, 0);
    while i < lhs.len() || j < rhs.len() {
        let order = match (lhs.get(i), rhs.get(j)) {
            (Some(a), Some(b)) => a.0.cmp(&b.0),
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };
        match order {
            Ordering::Equal => {
                report.matched(1);
                i += 1;
                j += 1;
            }
            Ordering::Less => {
                report.push(only(MismatchKind::LeftOnly, lhs[i].1));
                i += 1;
            }
            Ordering::Greater => {
                report.push(only(MismatchKind::RightOnly, rhs[j].1));
                j += 1;
            }
        }
    }
}

/// Sorted tuples of the items inside `window`, each with the item it came from.
fn project<'a>(
    result: &'a AggregateResult,
    window: Option<LedgerRange>,
    options: &ReportOptions,
) -> Vec<(IdentityTuple, &'a Item)> {
    let mut tuples: Vec<(IdentityTuple, &'a Item)> = result
        .items()
        .iter()
        .filter(|item| match (window, item.ledger_sequence()) {
            (Some(w), Some(seq)) => w.contains(seq),
            _ => true,
        })
        .map(|item| (item.tuple(&options.volatile_fields), item))
        .collect();
    tuples.sort_by(|a, b| a.0.cmp(&b.0));
    tuples
}

/// `Some(overlap)` when both sides carry coverage and it intersects; `None`
/// means no filtering.
fn comparison_window(left: Option<LedgerRange>, right: Option<LedgerRange>) -> Option<LedgerRange> {
    let (left, right) = (left?, right?);
    let window = left.overlap(&right);
    match window {
        Some(w) if w != left || w != right => {
            debug!(%left, %right, window = %w, "restricting comparison to overlapping ledgers");
        }
        None => warn!(%left, %right, "ledger coverage is disjoint, comparing everything"),
        _ => {}
    }
    window
}

fn only(kind: MismatchKind, item: &Item) -> MismatchDetail {
    let value = serde_json::to_value(item).ok();
    let (source_value, target_value) = match kind {
        MismatchKind::LeftOnly => (value, None),
        _ => (None, value),
    };
    MismatchDetail::new(kind, vec![item.identity().to_string()], source_value, target_value)
}

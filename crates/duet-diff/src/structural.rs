//! Recursive structural comparison of event payloads.
//!
//! Each side is deduplicated, keyed by a per-item identity, and paired by
//! key. Paired items are diffed recursively: mappings key-by-key, sequences
//! element-by-index with any length difference reported at that field.

use std::collections::{BTreeMap, BTreeSet};

use duet_types::{canonical_json, content_hash, text_or_canonical};
use serde_json::{Map, Value};
use tracing::debug;

use crate::report::{MismatchDetail, MismatchKind, ReconciliationReport, ReportBuilder, ReportOptions};

/// How a payload's identity key is derived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdentityKey {
    /// Value at a JSON pointer (`/transaction/hash`), falling back to the
    /// content hash when the pointer does not resolve.
    Pointer(String),
    /// BLAKE3 hash of the canonical form.
    Content,
}

impl IdentityKey {
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self::Pointer(pointer.into())
    }

    pub fn key_of(&self, value: &Value) -> String {
        match self {
            Self::Pointer(p) => match value.pointer(p) {
                Some(found) if !found.is_null() => text_or_canonical(found),
                _ => content_hash(canonical_json(value).as_bytes()),
            },
            Self::Content => content_hash(canonical_json(value).as_bytes()),
        }
    }
}

/// Compare two event sequences as deduplicated, identity-keyed sets with
/// recursive per-item diffs.
pub fn compare_structural(
    left: &[Value],
    right: &[Value],
    key: &IdentityKey,
    options: &ReportOptions,
) -> ReconciliationReport {
    let mut report = ReportBuilder::new(options);
    let lhs = keyed(left, key, options);
    let rhs = keyed(right, key, options);

    let (left_len, right_len) = (group_len(&lhs), group_len(&rhs));
    if left_len != right_len {
        report.push(MismatchDetail::new(
            MismatchKind::LengthMismatch,
            Vec::new(),
            Some(Value::from(left_len)),
            Some(Value::from(right_len)),
        ));
    }

    let keys: BTreeSet<&String> = lhs.keys().chain(rhs.keys()).collect();
    for k in keys {
        let empty = Vec::new();
        let a = lhs.get(k).unwrap_or(&empty);
        let b = rhs.get(k).unwrap_or(&empty);
        for idx in 0..a.len().max(b.len()) {
            let mut path = vec![k.clone()];
            if a.len().max(b.len()) > 1 {
                path.push(format!("[{idx}]"));
            }
            match (a.get(idx), b.get(idx)) {
                (Some(x), Some(y)) => {
                    let before = report.findings();
                    compare_values(&mut report, &mut path, x, y, options);
                    if report.findings() == before {
                        report.matched(1);
                    }
                }
                (Some(x), None) => report.push(MismatchDetail::new(
                    MismatchKind::LeftOnly,
                    path,
                    Some(x.clone()),
                    None,
                )),
                (None, Some(y)) => report.push(MismatchDetail::new(
                    MismatchKind::RightOnly,
                    path,
                    None,
                    Some(y.clone()),
                )),
                (None, None) => {}
            }
        }
    }

    let report = report.finish();
    debug!(
        verdict = %report.verdict,
        left = left.len(),
        right = right.len(),
        findings = report.mismatch_count(),
        "structural compare"
    );
    report
}

/// Recursive comparison of two single documents, symmetric in missing
/// fields. Volatile fields are skipped at any depth.
pub fn compare_documents(source: &Value, target: &Value, options: &ReportOptions) -> ReconciliationReport {
    let mut report = ReportBuilder::new(options);
    compare_values(&mut report, &mut Vec::new(), source, target, options);
    if report.findings() == 0 {
        report.matched(1);
    }
    report.finish()
}

/// Strip volatile fields, collapse identical items, and group by identity
/// key. Groups hold items in canonical order.
fn keyed(items: &[Value], key: &IdentityKey, options: &ReportOptions) -> BTreeMap<String, Vec<Value>> {
    let mut seen = BTreeSet::new();
    let mut groups: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();
    for item in items {
        let stable = strip_volatile(item, options);
        let canonical = canonical_json(&stable);
        if !seen.insert(canonical.clone()) {
            continue;
        }
        groups
            .entry(key.key_of(&stable))
            .or_default()
            .insert(canonical, stable);
    }
    groups
        .into_iter()
        .map(|(k, group)| (k, group.into_values().collect()))
        .collect()
}

fn group_len(groups: &BTreeMap<String, Vec<Value>>) -> usize {
    groups.values().map(Vec::len).sum()
}

fn strip_volatile(value: &Value, options: &ReportOptions) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !options.is_volatile(k))
                .map(|(k, v)| (k.clone(), strip_volatile(v, options)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| strip_volatile(v, options)).collect()),
        other => other.clone(),
    }
}

pub(crate) fn compare_values(
    report: &mut ReportBuilder,
    path: &mut Vec<String>,
    source: &Value,
    target: &Value,
    options: &ReportOptions,
) {
    match (source, target) {
        (Value::Object(a), Value::Object(b)) => {
            for (field, x) in a {
                if options.is_volatile(field) {
                    continue;
                }
                path.push(field.clone());
                match b.get(field) {
                    Some(y) => compare_values(report, path, x, y, options),
                    None => report.push(MismatchDetail::new(
                        MismatchKind::FieldMissing,
                        path.clone(),
                        Some(x.clone()),
                        None,
                    )),
                }
                path.pop();
            }
            for (field, y) in b {
                if options.is_volatile(field) || a.contains_key(field) {
                    continue;
                }
                path.push(field.clone());
                report.push(MismatchDetail::new(
                    MismatchKind::FieldMissing,
                    path.clone(),
                    None,
                    Some(y.clone()),
                ));
                path.pop();
            }
        }
        (Value::Array(a), Value::Array(b)) if a.len() != b.len() => {
            report.push(MismatchDetail::new(
                MismatchKind::LengthMismatch,
                path.clone(),
                Some(source.clone()),
                Some(target.clone()),
            ));
        }
        (Value::Array(a), Value::Array(b)) => {
            for (idx, (x, y)) in a.iter().zip(b).enumerate() {
                path.push(format!("[{idx}]"));
                compare_values(report, path, x, y, options);
                path.pop();
            }
        }
        (x, y) if x == y => {}
        _ => report.push(MismatchDetail::new(
            MismatchKind::FieldDiffers,
            path.clone(),
            Some(source.clone()),
            Some(target.clone()),
        )),
    }
}

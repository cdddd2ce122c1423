use serde_json::Value;
use tracing::debug;

use crate::report::{MismatchDetail, MismatchKind, ReconciliationReport, ReportBuilder, ReportOptions};

/// Every non-volatile field of `source` must be present in `target` with an
/// equal value. Extra target fields are ignored.
///
/// All fields are checked; the report lists every offending field rather than
/// the first one found.
pub fn compare_subset(source: &Value, target: &Value, options: &ReportOptions) -> ReconciliationReport {
    let mut report = ReportBuilder::new(options);
    subset_into(&mut report, Vec::new(), source, target, options);
    let report = report.finish();
    debug!(verdict = %report.verdict, findings = report.mismatch_count(), "subset compare");
    report
}

pub(crate) fn subset_into(
    report: &mut ReportBuilder,
    prefix: Vec<String>,
    source: &Value,
    target: &Value,
    options: &ReportOptions,
) {
    let (Value::Object(source), Value::Object(target)) = (source, target) else {
        if source == target {
            report.matched(1);
        } else {
            report.push(MismatchDetail::new(
                MismatchKind::FieldDiffers,
                prefix,
                Some(source.clone()),
                Some(target.clone()),
            ));
        }
        return;
    };

    for (field, expected) in source {
        if options.is_volatile(field) {
            continue;
        }
        let mut path = prefix.clone();
        path.push(field.clone());
        match target.get(field) {
            None => report.push(MismatchDetail::new(
                MismatchKind::FieldMissing,
                path,
                Some(expected.clone()),
                None,
            )),
            Some(actual) if actual == expected => report.matched(1),
            Some(actual) => report.push(MismatchDetail::new(
                MismatchKind::FieldDiffers,
                path,
                Some(expected.clone()),
                Some(actual.clone()),
            )),
        }
    }
}

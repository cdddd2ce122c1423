//! Reconciliation reports and the knobs that shape them.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which input a finding belongs to. The candidate is the source, the
/// reference is the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Target,
}

impl Side {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchKind {
    FieldMissing,
    FieldDiffers,
    LengthMismatch,
    LeftOnly,
    RightOnly,
    /// A record violates an ingestion invariant (malformed object key).
    IntegrityViolation,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FieldMissing => "field missing",
            Self::FieldDiffers => "field differs",
            Self::LengthMismatch => "length mismatch",
            Self::LeftOnly => "only in source",
            Self::RightOnly => "only in target",
            Self::IntegrityViolation => "integrity violation",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MismatchDetail {
    pub path: Vec<String>,
    pub source_value: Option<Value>,
    pub target_value: Option<Value>,
    pub kind: MismatchKind,
}

impl MismatchDetail {
    pub fn new(
        kind: MismatchKind,
        path: Vec<String>,
        source_value: Option<Value>,
        target_value: Option<Value>,
    ) -> Self {
        Self {
            path,
            source_value,
            target_value,
            kind,
        }
    }

    /// Dotted rendering; index segments (`[3]`) attach without a dot.
    pub fn path_string(&self) -> String {
        let mut out = String::new();
        for segment in &self.path {
            if !out.is_empty() && !segment.starts_with('[') {
                out.push('.');
            }
            out.push_str(segment);
        }
        if out.is_empty() {
            out.push('.');
        }
        out
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Match,
    Mismatch,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Match => f.write_str("match"),
            Self::Mismatch => f.write_str("mismatch"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub matched_count: usize,
    /// First `diagnostic_limit` findings, in discovery order.
    pub mismatches: Vec<MismatchDetail>,
    /// Findings dropped once the cap was reached.
    pub suppressed: usize,
    pub left_only_count: usize,
    pub right_only_count: usize,
    pub verdict: Verdict,
}

impl ReconciliationReport {
    pub fn is_match(&self) -> bool {
        self.verdict == Verdict::Match
    }

    /// All findings, including suppressed ones.
    pub fn mismatch_count(&self) -> usize {
        self.mismatches.len() + self.suppressed
    }

    pub fn count_of(&self, kind: MismatchKind) -> usize {
        self.mismatches.iter().filter(|m| m.kind == kind).count()
    }

    pub fn summary(&self) -> String {
        match self.verdict {
            Verdict::Match => format!("match: {} matched", self.matched_count),
            Verdict::Mismatch => format!(
                "mismatch: {} matched, {} findings ({} only in source, {} only in target{})",
                self.matched_count,
                self.mismatch_count(),
                self.left_only_count,
                self.right_only_count,
                if self.suppressed > 0 {
                    format!(", {} suppressed", self.suppressed)
                } else {
                    String::new()
                }
            ),
        }
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportOptions {
    /// Maximum number of findings kept in a report.
    pub diagnostic_limit: usize,
    /// Field names that legitimately differ between implementations.
    pub volatile_fields: Vec<String>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            diagnostic_limit: 50,
            volatile_fields: vec![
                "deserialization_time_microsecond".into(),
                "deserialization_time_microseconds".into(),
            ],
        }
    }
}

impl ReportOptions {
    pub fn is_volatile(&self, field: &str) -> bool {
        self.volatile_fields.iter().any(|v| v == field)
    }

    pub fn with_volatile(mut self, field: impl Into<String>) -> Self {
        self.volatile_fields.push(field.into());
        self
    }
}

/// Accumulates findings for one comparison call.
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    limit: usize,
    matched: usize,
    mismatches: Vec<MismatchDetail>,
    suppressed: usize,
    left_only: usize,
    right_only: usize,
}

impl ReportBuilder {
    pub(crate) fn new(options: &ReportOptions) -> Self {
        Self {
            limit: options.diagnostic_limit,
            matched: 0,
            mismatches: Vec::new(),
            suppressed: 0,
            left_only: 0,
            right_only: 0,
        }
    }

    pub(crate) fn matched(&mut self, n: usize) {
        self.matched += n;
    }

    pub(crate) fn push(&mut self, detail: MismatchDetail) {
        match detail.kind {
            MismatchKind::LeftOnly => self.left_only += 1,
            MismatchKind::RightOnly => self.right_only += 1,
            _ => {}
        }
        if self.mismatches.len() < self.limit {
            self.mismatches.push(detail);
        } else {
            self.suppressed += 1;
        }
    }

    pub(crate) fn findings(&self) -> usize {
        self.mismatches.len() + self.suppressed
    }

    pub(crate) fn finish(self) -> ReconciliationReport {
        let verdict = if self.findings() == 0 {
            Verdict::Match
        } else {
            Verdict::Mismatch
        };
        ReconciliationReport {
            matched_count: self.matched,
            mismatches: self.mismatches,
            suppressed: self.suppressed,
            left_only_count: self.left_only,
            right_only_count: self.right_only,
            verdict,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn differs(path: &[&str]) -> MismatchDetail {
        MismatchDetail::new(
            MismatchKind::FieldDiffers,
            path.iter().map(|s| s.to_string()).collect(),
            Some(json!(1)),
            Some(json!(2)),
        )
    }

    #[test]
    fn cap_suppresses_but_counts() {
        let options = ReportOptions { diagnostic_limit: 2, ..ReportOptions::default() };
        let mut builder = ReportBuilder::new(&options);
        for _ in 0..3 {
            builder.push(MismatchDetail::new(MismatchKind::LeftOnly, vec![], Some(json!("x")), None));
        }
        let report = builder.finish();
        assert_eq!(report.mismatches.len(), 2);
        assert_eq!(report.suppressed, 1);
        assert_eq!(report.left_only_count, 3);
        assert_eq!(report.mismatch_count(), 3);
        assert!(report.summary().contains("1 suppressed"));
    }

    #[test]
    fn empty_builder_is_match() {
        let mut builder = ReportBuilder::new(&ReportOptions::default());
        builder.matched(4);
        let report = builder.finish();
        assert!(report.is_match());
        assert_eq!(report.summary(), "match: 4 matched");
    }

    #[test]
    fn path_rendering() {
        assert_eq!(differs(&["meta", "AffectedNodes", "[2]", "Flags"]).path_string(), "meta.AffectedNodes[2].Flags");
        assert_eq!(differs(&[]).path_string(), ".");
    }

    #[test]
    fn default_volatile_fields() {
        let options = ReportOptions::default();
        assert!(options.is_volatile("deserialization_time_microseconds"));
        assert!(!options.is_volatile("Balance"));
    }
}

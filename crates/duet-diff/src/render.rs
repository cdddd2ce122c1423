//! Human-readable rendering of findings.

use serde_json::Value;
use similar::TextDiff;

use crate::report::MismatchDetail;

/// Unified line diff of two pretty-printed values.
pub fn value_diff(source: &Value, target: &Value) -> String {
    let old = pretty(source);
    let new = pretty(target);
    if old == new {
        return String::new();
    }
    TextDiff::from_lines(&old, &new)
        .unified_diff()
        .context_radius(2)
        .header("source", "target")
        .to_string()
}

/// One-line description of a finding.
pub fn detail_line(detail: &MismatchDetail) -> String {
    let show = |v: &Option<Value>| match v {
        Some(v) => compact(v),
        None => "-".to_owned(),
    };
    format!(
        "{}: {} (source {}, target {})",
        detail.path_string(),
        detail.kind,
        show(&detail.source_value),
        show(&detail.target_value)
    )
}

fn pretty(value: &Value) -> String {
    let mut text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    text.push('\n');
    text
}

fn compact(value: &Value) -> String {
    const MAX: usize = 80;
    let text = value.to_string();
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MismatchKind;
    use serde_json::json;

    #[test]
    fn unified_diff_marks_changed_lines() {
        let out = value_diff(&json!({"Fee": "10", "Flags": 0}), &json!({"Fee": "12", "Flags": 0}));
        assert!(out.contains("--- source"));
        assert!(out.contains("+++ target"));
        assert!(out.contains("-  \"Fee\": \"10\","));
        assert!(out.contains("+  \"Fee\": \"12\","));
    }

    #[test]
    fn identical_values_render_empty() {
        assert!(value_diff(&json!([1]), &json!([1])).is_empty());
    }

    #[test]
    fn detail_line_truncates_long_values() {
        let detail = MismatchDetail::new(
            MismatchKind::FieldDiffers,
            vec!["meta".into()],
            Some(json!("A".repeat(200))),
            None,
        );
        let line = detail_line(&detail);
        assert!(line.starts_with("meta: field differs (source \"AAA"));
        assert!(line.contains("...,"));
        assert!(line.ends_with("target -)"));
    }
}

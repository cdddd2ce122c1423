//! Canonical encodings of JSON values.
//!
//! Two servers may emit the same object with keys in a different order. Every
//! comparison that needs a byte-stable form goes through [`canonical_json`],
//! which sorts object keys at every depth.

use serde_json::Value;

/// Compact JSON with object keys sorted recursively.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// The string itself for string values, canonical JSON for anything else.
///
/// Binary responses carry blobs as hex strings while JSON responses carry the
/// decoded object; both end up as one comparable string.
pub fn text_or_canonical(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => canonical_json(other),
    }
}

/// Hex-encoded BLAKE3 hash of the given bytes.
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"d": [1, {"z": 0, "y": 1}], "c": null}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"c":null,"d":[1,{"y":1,"z":0}]},"b":1}"#
        );
    }

    #[test]
    fn canonical_escapes_keys() {
        let a = json!({"q\"uote": "v"});
        assert_eq!(canonical_json(&a), r#"{"q\"uote":"v"}"#);
    }

    #[test]
    fn text_or_canonical_passes_strings_through() {
        assert_eq!(text_or_canonical(&json!("ABCD")), "ABCD");
        assert_eq!(text_or_canonical(&json!({"k": 1})), r#"{"k":1}"#);
    }

    #[test]
    fn content_hash_is_stable_hex() {
        let h = content_hash(b"blob");
        assert_eq!(h.len(), 64);
        assert_eq!(h, content_hash(b"blob"));
        assert_ne!(h, content_hash(b"blob2"));
    }
}

//! Request parameters to sample from, and the template that turns one into
//! a request.

use std::path::Path;

use duet_protocol::{EndpointKind, RequestBuilder};
use duet_types::{AggregateResult, Item, LedgerRange};
use rand::Rng;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{LoadError, LoadResult};

/// A list of parameter objects, one per valid request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Corpus {
    entries: Vec<Value>,
}

impl Corpus {
    pub fn new(entries: Vec<Value>) -> Self {
        Self { entries }
    }

    /// One entry per non-empty line.
    ///
    /// A bare token becomes `{field: token}`. A JSON object is taken as-is
    /// when it already carries `field`; otherwise a key matching `field`
    /// case-insensitively (`Account` for `account`) supplies the value.
    pub fn from_lines(text: &str, field: &str) -> LoadResult<Self> {
        let mut entries = Vec::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let entry = if line.starts_with('{') {
                object_entry(line, field).map_err(|reason| LoadError::Corpus { line: idx + 1, reason })?
            } else {
                single(field, Value::String(line.to_owned()))
            };
            entries.push(entry);
        }
        debug!(field, entries = entries.len(), "corpus loaded");
        Ok(Self { entries })
    }

    pub fn from_file(path: impl AsRef<Path>, field: &str) -> LoadResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_lines(&text, field)
    }

    /// `{"ledger_index": n}` for every ledger in `range`.
    pub fn ledgers(range: LedgerRange) -> Self {
        Self {
            entries: range.iter().map(|seq| single("ledger_index", Value::from(seq))).collect(),
        }
    }

    /// `{"index": key}` for every ledger object in a scan, for single-entry
    /// lookups.
    pub fn object_keys(scan: &AggregateResult) -> Self {
        let entries: Vec<Value> = scan
            .items()
            .iter()
            .filter_map(|item| match item {
                Item::LedgerObject(object) => Some(single("index", Value::String(object.key.clone()))),
                _ => None,
            })
            .collect();
        debug!(entries = entries.len(), "object key corpus sampled");
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    /// Uniform pick. `None` only for an empty corpus.
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Option<&Value> {
        if self.entries.is_empty() {
            return None;
        }
        self.entries.get(rng.gen_range(0..self.entries.len()))
    }
}

fn single(field: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(field.to_owned(), value);
    Value::Object(map)
}

fn object_entry(line: &str, field: &str) -> Result<Value, String> {
    let object = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return Err("not a JSON object".into()),
        Err(e) => return Err(e.to_string()),
    };
    if object.contains_key(field) {
        return Ok(Value::Object(object));
    }
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(field))
        .map(|(_, v)| single(field, v.clone()))
        .ok_or_else(|| format!("no `{field}` field"))
}

/// Fixed parameters for an endpoint; each corpus entry is layered on top.
#[derive(Clone, Debug)]
pub struct RequestTemplate {
    kind: EndpointKind,
    fixed: Map<String, Value>,
    limit: Option<u32>,
}

impl RequestTemplate {
    pub fn new(kind: EndpointKind) -> Self {
        Self {
            kind,
            fixed: Map::new(),
            limit: None,
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fixed.insert(key.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    pub fn request(&self, entry: &Value) -> LoadResult<Value> {
        let request = RequestBuilder::new(self.kind)
            .params(&Value::Object(self.fixed.clone()))
            .params(entry)
            .build(None, self.limit)?;
        Ok(request)
    }

    /// Every corpus entry rendered up front, so a bad template fails before
    /// any worker starts.
    pub fn render(&self, corpus: &Corpus) -> LoadResult<Vec<Value>> {
        corpus.entries().iter().map(|entry| self.request(entry)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use std::io::Write;

    const ACCOUNT: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

    #[test]
    fn bare_tokens_and_json_lines() {
        let text = format!("{ACCOUNT}\n\n{{\"Account\": \"rB\", \"Fee\": \"10\"}}\n{{\"account\": \"rC\", \"ledger_index\": 5}}\n");
        let corpus = Corpus::from_lines(&text, "account").unwrap();
        assert_eq!(
            corpus.entries(),
            &[
                json!({"account": ACCOUNT}),
                json!({"account": "rB"}),
                json!({"account": "rC", "ledger_index": 5}),
            ]
        );
    }

    #[test]
    fn json_line_without_field_is_reported() {
        let err = Corpus::from_lines("rA\n{\"Fee\": \"10\"}\n", "account").unwrap_err();
        assert!(matches!(err, LoadError::Corpus { line: 2, .. }), "{err}");
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "{}", "A".repeat(64)).unwrap();
        writeln!(file, "{}", "B".repeat(64)).unwrap();
        let corpus = Corpus::from_file(file.path(), "transaction").unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.entries()[1]["transaction"], json!("B".repeat(64)));
    }

    #[test]
    fn ledger_corpus_covers_range() {
        let corpus = Corpus::ledgers(LedgerRange::new(10, 12).unwrap());
        let seqs: Vec<u64> = corpus.entries().iter().filter_map(|e| e["ledger_index"].as_u64()).collect();
        assert_eq!(seqs, vec![10, 11, 12]);
    }

    #[test]
    fn object_key_corpus_from_scan() {
        use duet_types::{LedgerObjectRecord, RecordKind};
        let object = |key: String| {
            Item::LedgerObject(LedgerObjectRecord { key, value_blob: "11".into(), entry_type: None })
        };
        let tx = Item::from_record(RecordKind::Transaction, &json!({"tx_blob": "AB", "meta": "CD", "ledger_index": 3})).unwrap();
        let scan = AggregateResult::from_items([object("A".repeat(64)), tx, object("B".repeat(64))]);
        let corpus = Corpus::object_keys(&scan);
        assert_eq!(corpus.entries(), &[json!({"index": "A".repeat(64)}), json!({"index": "B".repeat(64)})]);

        let request = RequestTemplate::new(EndpointKind::LedgerEntry)
            .param("ledger_index", 3)
            .request(&corpus.entries()[1])
            .unwrap();
        assert_eq!(request, json!({"command": "ledger_entry", "index": "B".repeat(64), "ledger_index": 3}));
    }

    #[test]
    fn sampling_is_reproducible_per_seed() {
        let corpus = Corpus::ledgers(LedgerRange::new(1, 1000).unwrap());
        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..20).filter_map(|_| corpus.sample(&mut rng).cloned()).collect::<Vec<_>>()
        };
        assert_eq!(draw(7), draw(7));
        assert_ne!(draw(7), draw(8));
        assert!(Corpus::default().sample(&mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn template_layers_entry_over_fixed_params() {
        let template = RequestTemplate::new(EndpointKind::AccountSnapshot).param("ledger_index", "validated");
        let request = template.request(&json!({"account": "rA"})).unwrap();
        assert_eq!(request["command"], "account_info");
        assert_eq!(request["account"], "rA");
        assert_eq!(request["ledger_index"], "validated");
    }

    #[test]
    fn template_missing_required_param_fails_render() {
        let template = RequestTemplate::new(EndpointKind::AccountSnapshot);
        let corpus = Corpus::new(vec![json!({"ledger_index": 3})]);
        assert!(matches!(template.render(&corpus), Err(LoadError::Protocol(_))));
    }
}

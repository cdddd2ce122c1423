//! Decoded records returned by paginated query endpoints.
//!
//! The two servers under comparison spell the same record differently
//! (`transaction` vs `tx_blob`, `ledger_sequence` vs `ledger_index`). Decoding
//! accepts either dialect and produces one representation, so everything
//! downstream compares like with like.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::content::{canonical_json, content_hash, text_or_canonical};
use crate::error::TypeError;

/// Required length of a ledger object key, in hex characters.
pub const OBJECT_KEY_HEX_LEN: usize = 64;

/// Which record shape an endpoint's item list holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Transaction,
    LedgerObject,
    Offer,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction => write!(f, "transaction"),
            Self::LedgerObject => write!(f, "ledger-object"),
            Self::Offer => write!(f, "offer"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub blob: String,
    pub metadata_blob: String,
    pub ledger_sequence: u32,
    /// Server-provided hash, or the BLAKE3 hash of `blob` when absent.
    pub hash: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerObjectRecord {
    pub key: String,
    pub value_blob: String,
    /// Type tag used for scan filtering: hex tag from a binary blob, or
    /// `LedgerEntryType` from a JSON object.
    pub entry_type: Option<String>,
}

impl LedgerObjectRecord {
    /// Keys must be exactly 64 hexadecimal characters.
    pub fn has_valid_key(&self) -> bool {
        self.key.len() == OBJECT_KEY_HEX_LEN && hex::decode(&self.key).is_ok()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRecord {
    pub index: String,
    pub fields: Map<String, Value>,
}

/// One record from a crawl.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Item {
    Transaction(TransactionRecord),
    LedgerObject(LedgerObjectRecord),
    Offer(OfferRecord),
}

/// Explicit identity key per item variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemIdentity {
    Transaction { ledger_sequence: u32, hash: String },
    Object(String),
    Offer(String),
}

impl fmt::Display for ItemIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transaction {
                ledger_sequence,
                hash,
            } => write!(f, "tx {hash} @ {ledger_sequence}"),
            Self::Object(key) => write!(f, "object {key}"),
            Self::Offer(index) => write!(f, "offer {index}"),
        }
    }
}

/// Canonical projection of an item used for set/multiset comparison.
///
/// Ordering is lexicographic: ledger first (items without a ledger sort
/// before those with one), then each field in turn.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityTuple {
    pub ledger: Option<u32>,
    pub fields: Vec<String>,
}

impl fmt::Display for IdentityTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ledger) = self.ledger {
            write!(f, "@{ledger} ")?;
        }
        write!(f, "({})", self.fields.join(", "))
    }
}

impl Item {
    /// Decode a raw record of the given kind.
    pub fn from_record(kind: RecordKind, record: &Value) -> Result<Self, TypeError> {
        Self::from_record_at(kind, record, None)
    }

    /// Decode a record from a single-ledger query. Transactions that carry no
    /// ledger field of their own inherit `ledger`.
    pub fn from_record_at(
        kind: RecordKind,
        record: &Value,
        ledger: Option<u32>,
    ) -> Result<Self, TypeError> {
        let map = record
            .as_object()
            .ok_or_else(|| TypeError::InvalidField {
                field: kind.to_string(),
                reason: format!("expected object, got {record}"),
            })?;
        match kind {
            RecordKind::Transaction => decode_transaction(map, ledger).map(Self::Transaction),
            RecordKind::LedgerObject => decode_object(map).map(Self::LedgerObject),
            RecordKind::Offer => decode_offer(map).map(Self::Offer),
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::Transaction(_) => RecordKind::Transaction,
            Self::LedgerObject(_) => RecordKind::LedgerObject,
            Self::Offer(_) => RecordKind::Offer,
        }
    }

    pub fn identity(&self) -> ItemIdentity {
        match self {
            Self::Transaction(tx) => ItemIdentity::Transaction {
                ledger_sequence: tx.ledger_sequence,
                hash: tx.hash.clone(),
            },
            Self::LedgerObject(obj) => ItemIdentity::Object(obj.key.clone()),
            Self::Offer(offer) => ItemIdentity::Offer(offer.index.clone()),
        }
    }

    /// Ledger the item belongs to, when the record carries one.
    pub fn ledger_sequence(&self) -> Option<u32> {
        match self {
            Self::Transaction(tx) => Some(tx.ledger_sequence),
            _ => None,
        }
    }

    /// Project to the canonical comparison tuple, skipping offer fields named
    /// in `volatile`.
    pub fn tuple(&self, volatile: &[String]) -> IdentityTuple {
        match self {
            Self::Transaction(tx) => IdentityTuple {
                ledger: Some(tx.ledger_sequence),
                fields: vec![tx.blob.clone(), tx.metadata_blob.clone()],
            },
            Self::LedgerObject(obj) => IdentityTuple {
                ledger: None,
                fields: vec![obj.key.clone(), obj.value_blob.clone()],
            },
            Self::Offer(offer) => {
                let stable: Map<String, Value> = offer
                    .fields
                    .iter()
                    .filter(|(k, _)| !volatile.iter().any(|v| v == *k))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                IdentityTuple {
                    ledger: None,
                    fields: vec![offer.index.clone(), canonical_json(&Value::Object(stable))],
                }
            }
        }
    }

    /// Type tag for scan filtering; only ledger objects carry one.
    pub fn type_tag(&self) -> Option<&str> {
        match self {
            Self::LedgerObject(obj) => obj.entry_type.as_deref(),
            _ => None,
        }
    }
}

fn first<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|n| map.get(*n))
}

fn require<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Result<&'a Value, TypeError> {
    first(map, names).ok_or_else(|| TypeError::MissingField(names.join("|")))
}

fn decode_sequence(field: &str, value: &Value) -> Result<u32, TypeError> {
    let invalid = |reason: String| TypeError::InvalidField {
        field: field.into(),
        reason,
    };
    let n = match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| invalid(format!("{n} is not unsigned")))?,
        Value::String(s) => s.parse::<u64>().map_err(|e| invalid(e.to_string()))?,
        other => return Err(invalid(format!("unexpected {other}"))),
    };
    u32::try_from(n).map_err(|_| invalid(format!("{n} exceeds u32")))
}

fn decode_transaction(
    map: &Map<String, Value>,
    inherited: Option<u32>,
) -> Result<TransactionRecord, TypeError> {
    const LEDGER: &[&str] = &["ledger_sequence", "ledger_index"];
    let tx = require(map, &["transaction", "tx_blob", "tx"])?;
    let meta = require(map, &["metadata", "meta"])?;
    let ledger_sequence = match (first(map, LEDGER), inherited) {
        (Some(value), _) => decode_sequence("ledger_sequence", value)?,
        (None, Some(seq)) => seq,
        (None, None) => return Err(TypeError::MissingField(LEDGER.join("|"))),
    };
    let blob = text_or_canonical(tx);
    let hash = map
        .get("hash")
        .or_else(|| tx.get("hash"))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_else(|| content_hash(blob.as_bytes()));
    Ok(TransactionRecord {
        blob,
        metadata_blob: text_or_canonical(meta),
        ledger_sequence,
        hash,
    })
}

fn decode_object(map: &Map<String, Value>) -> Result<LedgerObjectRecord, TypeError> {
    let key = require(map, &["index"])?
        .as_str()
        .ok_or_else(|| TypeError::InvalidField {
            field: "index".into(),
            reason: "expected string".into(),
        })?
        .to_owned();
    // `data`/`node_binary` carry the binary form; `node` is the JSON form a
    // single-entry lookup returns.
    if let Some(data) = first(map, &["data", "node_binary"]).and_then(Value::as_str) {
        return Ok(LedgerObjectRecord {
            key,
            value_blob: data.to_owned(),
            entry_type: data.get(2..6).map(str::to_owned),
        });
    }
    let body = match map.get("node") {
        Some(Value::Object(node)) => node,
        _ => map,
    };
    Ok(LedgerObjectRecord {
        key,
        value_blob: canonical_json(&Value::Object(body.clone())),
        entry_type: body
            .get("LedgerEntryType")
            .and_then(Value::as_str)
            .map(str::to_owned),
    })
}

fn decode_offer(map: &Map<String, Value>) -> Result<OfferRecord, TypeError> {
    let index = require(map, &["index"])?
        .as_str()
        .ok_or_else(|| TypeError::InvalidField {
            field: "index".into(),
            reason: "expected string".into(),
        })?
        .to_owned();
    let mut fields = map.clone();
    fields.remove("index");
    Ok(OfferRecord { index, fields })
}

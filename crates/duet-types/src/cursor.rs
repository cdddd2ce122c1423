use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TypeError;

/// Continuation token returned by a paginated endpoint.
///
/// Equality is structural: two cursors are the same resume point only if
/// every component matches.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cursor {
    /// Server-defined token, typically a 64-hex ledger key.
    Opaque(String),
    /// Position inside an account's transaction history.
    LedgerPosition {
        ledger_sequence: u32,
        transaction_index: u32,
    },
}

impl Cursor {
    pub fn opaque(token: impl Into<String>) -> Self {
        Self::Opaque(token.into())
    }

    pub fn position(ledger_sequence: u32, transaction_index: u32) -> Self {
        Self::LedgerPosition {
            ledger_sequence,
            transaction_index,
        }
    }

    /// Decode a continuation value as found in a response.
    ///
    /// Accepts a string, a number (kept as its decimal text), or an object
    /// spelled either `{ledger_sequence, transaction_index}` or `{ledger, seq}`.
    pub fn from_wire(value: &Value) -> Result<Self, TypeError> {
        match value {
            Value::String(s) => Ok(Self::Opaque(s.clone())),
            Value::Number(n) => Ok(Self::Opaque(n.to_string())),
            Value::Object(map) => {
                let pair = |ledger: &str, index: &str| {
                    Some((map.get(ledger)?.as_u64()?, map.get(index)?.as_u64()?))
                };
                let (ledger, index) = pair("ledger_sequence", "transaction_index")
                    .or_else(|| pair("ledger", "seq"))
                    .ok_or_else(|| {
                        TypeError::InvalidCursor(format!("unrecognised cursor object {value}"))
                    })?;
                Ok(Self::position(narrow(ledger)?, narrow(index)?))
            }
            other => Err(TypeError::InvalidCursor(format!(
                "unsupported cursor value {other}"
            ))),
        }
    }

    /// Value for the request's `"cursor"` field.
    pub fn cursor_value(&self) -> Value {
        match self {
            Self::Opaque(s) => Value::String(s.clone()),
            Self::LedgerPosition {
                ledger_sequence,
                transaction_index,
            } => json!({
                "ledger_sequence": ledger_sequence,
                "transaction_index": transaction_index,
            }),
        }
    }

    /// Value for the request's `"marker"` field.
    pub fn marker_value(&self) -> Value {
        match self {
            Self::Opaque(s) => Value::String(s.clone()),
            Self::LedgerPosition {
                ledger_sequence,
                transaction_index,
            } => json!({ "ledger": ledger_sequence, "seq": transaction_index }),
        }
    }

    pub fn ledger_sequence(&self) -> Option<u32> {
        match self {
            Self::Opaque(_) => None,
            Self::LedgerPosition {
                ledger_sequence, ..
            } => Some(*ledger_sequence),
        }
    }
}

fn narrow(n: u64) -> Result<u32, TypeError> {
    u32::try_from(n).map_err(|_| TypeError::InvalidCursor(format!("{n} exceeds u32")))
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Opaque(s) => write!(f, "{s}"),
            Self::LedgerPosition {
                ledger_sequence,
                transaction_index,
            } => write!(f, "{ledger_sequence}:{transaction_index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_string_as_opaque() {
        let c = Cursor::from_wire(&json!("00AB")).unwrap();
        assert_eq!(c, Cursor::opaque("00AB"));
        assert_eq!(c.ledger_sequence(), None);
    }

    #[test]
    fn decodes_both_position_spellings() {
        let a = Cursor::from_wire(&json!({"ledger_sequence": 7, "transaction_index": 2})).unwrap();
        let b = Cursor::from_wire(&json!({"ledger": 7, "seq": 2})).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.ledger_sequence(), Some(7));
    }

    #[test]
    fn numeric_marker_kept_as_text() {
        let c = Cursor::from_wire(&json!(41)).unwrap();
        assert_eq!(c, Cursor::opaque("41"));
    }

    #[test]
    fn rejects_unknown_shapes() {
        assert!(Cursor::from_wire(&json!({"page": 3})).is_err());
        assert!(Cursor::from_wire(&json!(true)).is_err());
        assert!(Cursor::from_wire(&json!({"ledger": 5_000_000_000u64, "seq": 1})).is_err());
    }

    #[test]
    fn encodes_both_spellings() {
        let c = Cursor::position(10, 3);
        assert_eq!(
            c.cursor_value(),
            json!({"ledger_sequence": 10, "transaction_index": 3})
        );
        assert_eq!(c.marker_value(), json!({"ledger": 10, "seq": 3}));
        assert_eq!(Cursor::from_wire(&c.marker_value()).unwrap(), c);
    }

    #[test]
    fn structural_equality() {
        assert_ne!(Cursor::position(1, 2), Cursor::position(1, 3));
        assert_ne!(Cursor::opaque("1:2"), Cursor::position(1, 2));
        assert_eq!(Cursor::position(1, 2).to_string(), "1:2");
    }
}

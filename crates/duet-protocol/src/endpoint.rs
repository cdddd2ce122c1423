//! Endpoint Descriptor table.
//!
//! Maps each logical operation to its command name, required parameters, and
//! the location of its payload inside an (unwrapped) response.

use std::fmt;
use std::str::FromStr;

use duet_types::RecordKind;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Logical operations the harness knows how to issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    AccountSnapshot,
    TransactionByHash,
    TransactionHistory,
    LedgerObjectScan,
    OrderBookScan,
    LedgerClosedSubscription,
    Ledger,
    LedgerRange,
    ServerInfo,
    LedgerEntry,
}

/// Where an endpoint's payload lives. Paths may be dotted (`ledger.transactions`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadShape {
    /// An array of records; the first path that resolves to an array wins.
    List(&'static [&'static str]),
    /// A single object; the first path that resolves to an object wins.
    Object(&'static [&'static str]),
    /// The unwrapped payload itself.
    Whole,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EndpointDescriptor {
    pub kind: EndpointKind,
    pub command: &'static str,
    pub required: &'static [&'static str],
    pub payload: PayloadShape,
    /// Record shape of list items, for endpoints whose items decode into [`duet_types::Item`].
    pub record: Option<RecordKind>,
    pub paginated: bool,
}

const TABLE: &[EndpointDescriptor] = &[
    EndpointDescriptor {
        kind: EndpointKind::AccountSnapshot,
        command: "account_info",
        required: &["account"],
        payload: PayloadShape::Object(&["account_data", "object"]),
        record: None,
        paginated: false,
    },
    EndpointDescriptor {
        kind: EndpointKind::TransactionByHash,
        command: "tx",
        required: &["transaction"],
        payload: PayloadShape::Whole,
        record: Some(RecordKind::Transaction),
        paginated: false,
    },
    EndpointDescriptor {
        kind: EndpointKind::TransactionHistory,
        command: "account_tx",
        required: &["account"],
        payload: PayloadShape::List(&["transactions"]),
        record: Some(RecordKind::Transaction),
        paginated: true,
    },
    EndpointDescriptor {
        kind: EndpointKind::LedgerObjectScan,
        command: "ledger_data",
        required: &["ledger_index"],
        payload: PayloadShape::List(&["state", "objects"]),
        record: Some(RecordKind::LedgerObject),
        paginated: true,
    },
    EndpointDescriptor {
        kind: EndpointKind::OrderBookScan,
        command: "book_offers",
        required: &["taker_pays", "taker_gets"],
        payload: PayloadShape::List(&["offers"]),
        record: Some(RecordKind::Offer),
        paginated: true,
    },
    EndpointDescriptor {
        kind: EndpointKind::LedgerClosedSubscription,
        command: "subscribe",
        required: &["streams"],
        payload: PayloadShape::Whole,
        record: None,
        paginated: false,
    },
    EndpointDescriptor {
        kind: EndpointKind::Ledger,
        command: "ledger",
        required: &["ledger_index"],
        payload: PayloadShape::List(&["transactions", "ledger.transactions"]),
        record: Some(RecordKind::Transaction),
        paginated: false,
    },
    EndpointDescriptor {
        kind: EndpointKind::LedgerRange,
        command: "ledger_range",
        required: &[],
        payload: PayloadShape::Whole,
        record: None,
        paginated: false,
    },
    EndpointDescriptor {
        kind: EndpointKind::ServerInfo,
        command: "server_info",
        required: &[],
        payload: PayloadShape::Object(&["info"]),
        record: None,
        paginated: false,
    },
    EndpointDescriptor {
        kind: EndpointKind::LedgerEntry,
        command: "ledger_entry",
        required: &["index"],
        payload: PayloadShape::Whole,
        record: Some(RecordKind::LedgerObject),
        paginated: false,
    },
];

/// The full descriptor table.
pub fn endpoints() -> &'static [EndpointDescriptor] {
    TABLE
}

/// Descriptor for one endpoint kind. `TABLE` is laid out in declaration order.
pub fn descriptor(kind: EndpointKind) -> &'static EndpointDescriptor {
    &TABLE[kind as usize]
}

impl EndpointKind {
    pub const ALL: [EndpointKind; 10] = [
        Self::AccountSnapshot,
        Self::TransactionByHash,
        Self::TransactionHistory,
        Self::LedgerObjectScan,
        Self::OrderBookScan,
        Self::LedgerClosedSubscription,
        Self::Ledger,
        Self::LedgerRange,
        Self::ServerInfo,
        Self::LedgerEntry,
    ];

    pub fn descriptor(self) -> &'static EndpointDescriptor {
        descriptor(self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AccountSnapshot => "account_snapshot",
            Self::TransactionByHash => "transaction_by_hash",
            Self::TransactionHistory => "transaction_history",
            Self::LedgerObjectScan => "ledger_object_scan",
            Self::OrderBookScan => "order_book_scan",
            Self::LedgerClosedSubscription => "ledger_closed_subscription",
            Self::Ledger => "ledger",
            Self::LedgerRange => "ledger_range",
            Self::ServerInfo => "server_info",
            Self::LedgerEntry => "ledger_entry",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts the logical name or the wire command (`account_tx`).
impl FromStr for EndpointKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s || k.descriptor().command == s)
            .ok_or_else(|| ProtocolError::UnknownEndpoint(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_covers_every_kind_once() {
        for kind in EndpointKind::ALL {
            assert_eq!(endpoints().iter().filter(|d| d.kind == kind).count(), 1, "{kind}");
            assert_eq!(descriptor(kind).kind, kind);
        }
        assert_eq!(endpoints().len(), EndpointKind::ALL.len());
    }

    #[test]
    fn paginated_endpoints_carry_records() {
        for d in endpoints().iter().filter(|d| d.paginated) {
            assert!(d.record.is_some(), "{}", d.kind);
            assert!(matches!(d.payload, PayloadShape::List(_)));
        }
    }

    #[test]
    fn parse_by_name_or_command() {
        assert_eq!("account_tx".parse::<EndpointKind>().unwrap(), EndpointKind::TransactionHistory);
        assert_eq!("ledger_object_scan".parse::<EndpointKind>().unwrap(), EndpointKind::LedgerObjectScan);
        assert!("nope".parse::<EndpointKind>().is_err());
    }

    #[test]
    fn ledger_entry_is_a_single_object_record() {
        let d = "ledger_entry".parse::<EndpointKind>().unwrap().descriptor();
        assert_eq!(d.kind, EndpointKind::LedgerEntry);
        assert_eq!(d.required, &["index"]);
        assert_eq!(d.record, Some(RecordKind::LedgerObject));
        assert!(!d.paginated);
    }

    #[test]
    fn serde_uses_snake_case() {
        let v = serde_json::to_value(EndpointKind::OrderBookScan).unwrap();
        assert_eq!(v, serde_json::json!("order_book_scan"));
    }
}

//! Foundation types for duet, the differential verification harness.
//!
//! Every other duet crate depends on `duet-types`. The types here describe
//! what a paginated ledger query returns, independently of which server
//! dialect produced it.
//!
//! # Key Types
//!
//! - [`Cursor`] — Continuation token (opaque string or ledger position)
//! - [`Item`] — One decoded record: transaction, ledger object, or offer
//! - [`AggregateBuilder`] / [`AggregateResult`] — Accumulated and frozen crawl output
//! - [`LedgerRange`] — Inclusive `[min, max]` ledger coverage bound
//! - [`IdentityTuple`] — Canonical, totally ordered projection used for set comparison

pub mod aggregate;
pub mod content;
pub mod cursor;
pub mod error;
pub mod item;
pub mod range;

pub use aggregate::{AggregateBuilder, AggregateResult};
pub use content::{canonical_json, content_hash, text_or_canonical};
pub use cursor::Cursor;
pub use error::TypeError;
pub use item::{
    IdentityTuple, Item, ItemIdentity, LedgerObjectRecord, OfferRecord, RecordKind,
    TransactionRecord, OBJECT_KEY_HEX_LEN,
};
pub use range::LedgerRange;

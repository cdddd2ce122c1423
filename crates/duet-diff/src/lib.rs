//! Reconciliation engine for duet.
//!
//! Compares what the candidate and reference servers returned and produces
//! a [`ReconciliationReport`]. Every comparison is a pure function of its
//! inputs.
//!
//! # Comparison modes
//!
//! - [`compare_subset`] -- every non-volatile source field must appear in the target unchanged
//! - [`compare_tuples`] -- multiset of identity tuples, restricted to the overlapping ledger window
//! - [`compare_structural`] -- dedup, key by identity, then recursive field-by-field diff
//! - [`compare_ledgers`] -- ledger header plus its transaction multiset

pub mod error;
pub mod ledger;
pub mod render;
pub mod report;
pub mod structural;
pub mod subset;
pub mod tuples;

pub use error::{DiffError, DiffResult};
pub use ledger::compare_ledgers;
pub use render::{detail_line, value_diff};
pub use report::{MismatchDetail, MismatchKind, ReconciliationReport, ReportOptions, Side, Verdict};
pub use structural::{compare_documents, compare_structural, IdentityKey};
pub use subset::compare_subset;
pub use tuples::{check_object_keys, compare_tuples};

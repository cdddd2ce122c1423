//! Error types for the diff crate.

use duet_types::TypeError;

/// Failures that prevent a comparison from being made at all.
///
/// Differences between the inputs are never errors; they are reported.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    #[error("{side} payload has no {section}")]
    MissingSection { side: &'static str, section: &'static str },

    #[error("undecodable record: {0}")]
    Record(#[from] TypeError),
}

pub type DiffResult<T> = Result<T, DiffError>;

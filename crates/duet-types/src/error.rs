use thiserror::Error;

/// Errors produced while decoding or validating foundation types.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("record is missing field `{0}`")]
    MissingField(String),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("invalid ledger range: {0}")]
    InvalidRange(String),
}

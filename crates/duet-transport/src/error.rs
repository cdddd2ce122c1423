use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("cannot reach {address}: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("undecodable message: {0}")]
    Decode(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("cancelled")]
    Cancelled,
}

impl TransportError {
    /// Whether the session is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Decode(_))
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

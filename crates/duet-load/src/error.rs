use duet_protocol::ProtocolError;
use duet_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("no worker could connect to {target}: {source}")]
    Connect { target: String, source: TransportError },

    #[error("invalid load options: {0}")]
    InvalidOptions(String),

    #[error("corpus is empty")]
    EmptyCorpus,

    #[error("corpus line {line}: {reason}")]
    Corpus { line: usize, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request template: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("load run cancelled")]
    Cancelled,
}

pub type LoadResult<T> = Result<T, LoadError>;

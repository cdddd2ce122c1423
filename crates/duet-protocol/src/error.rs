use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("command `{command}` requires parameter `{param}`")]
    MissingParameter {
        command: &'static str,
        param: &'static str,
    },

    #[error("unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("type error: {0}")]
    Type(#[from] duet_types::TypeError),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

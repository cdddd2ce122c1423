use duet_protocol::{EndpointKind, ProtocolError, ServerFault};
use duet_transport::TransportError;
use duet_types::{Cursor, TypeError};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CrawlError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("undecodable record: {0}")]
    Record(#[from] TypeError),

    #[error("server error after {attempts} attempts: {fault}")]
    ServerError { attempts: u32, fault: ServerFault },

    #[error("cursor {cursor} returned again after page {page}")]
    LoopDetected { cursor: Cursor, page: usize },

    #[error("endpoint {0} does not return item records")]
    NotItemized(EndpointKind),

    #[error("crawl cancelled")]
    Cancelled,
}

impl CrawlError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Transport(TransportError::Cancelled))
    }
}

pub type CrawlResult<T> = Result<T, CrawlError>;

use duet_diff::{ReconciliationReport, Side};
use duet_protocol::{ProtocolError, ServerFault};
use duet_transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("{side} transport error: {source}")]
    Transport { side: Side, source: TransportError },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("{side} rejected the subscription: {fault}")]
    AckRejected { side: Side, fault: ServerFault },

    #[error("{side} did not acknowledge the subscription in time")]
    AckTimeout { side: Side },

    #[error("subscription acknowledgements differ: {}", .0.summary())]
    AckMismatch(Box<ReconciliationReport>),

    #[error("{side} sent no ledger boundary within {waited_ms} ms")]
    BoundaryTimeout { side: Side, waited_ms: u64 },

    #[error("boundaries disagree on ledger: source {source_ledger}, target {target_ledger}")]
    BoundarySkew { source_ledger: u32, target_ledger: u32 },

    #[error("live divergence in batch {batch}: {}", .report.summary())]
    LiveDivergence {
        batch: usize,
        ledger: Option<u32>,
        report: Box<ReconciliationReport>,
    },

    #[error("stream reconciliation cancelled")]
    Cancelled,
}

impl StreamError {
    pub(crate) fn transport(side: Side) -> impl FnOnce(TransportError) -> Self {
        move |source| Self::Transport { side, source }
    }
}

pub type StreamResult<T> = Result<T, StreamError>;

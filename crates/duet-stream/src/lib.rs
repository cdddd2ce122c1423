//! Stream Reconciler.
//!
//! Subscribes to the same live streams on both servers, cuts each stream
//! into per-ledger batches at the boundary event, and requires every pair
//! of batches to match structurally.
//!
//! The run moves through SUBSCRIBE, AWAIT_ACK, and STEADY. Each side's
//! receive loop runs in its own task; the only synchronization point is the
//! hand-off of a sealed batch pair to the comparison.

pub mod batch;
pub mod error;
pub mod options;
pub mod reconciler;

pub use batch::{EventClass, EventFilter, LiveBatch};
pub use error::{StreamError, StreamResult};
pub use options::StreamOptions;
pub use reconciler::{BatchOutcome, StreamReconciler, StreamSummary};

//! Load Harness.
//!
//! Sends sampled requests to one endpoint from several concurrent workers
//! and keeps every call's latency so tail percentiles can be read off the
//! report.
//!
//! - **Corpus**: request parameters to sample from (accounts, hashes, keys, books)
//! - **RequestTemplate**: turns a corpus entry into a wire request
//! - **LoadHarness**: spawns the workers and collects their samples
//! - **LoadReport**: throughput, slow calls, and latency statistics

pub mod corpus;
pub mod error;
pub mod harness;
pub mod options;
pub mod report;

pub use corpus::{Corpus, RequestTemplate};
pub use error::{LoadError, LoadResult};
pub use harness::LoadHarness;
pub use options::LoadOptions;
pub use report::{CallFailure, CallSample, LatencyStats, LoadReport};

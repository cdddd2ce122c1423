//! Pagination Crawler.
//!
//! Walks one cursor-paginated endpoint to exhaustion and reassembles the
//! complete result. See [`Crawler`] for the state machine and
//! [`probe`] for ledger range discovery.

pub mod crawler;
pub mod error;
pub mod options;
pub mod probe;

pub use crawler::{CrawlOutcome, Crawler};
pub use error::{CrawlError, CrawlResult};
pub use options::CrawlOptions;
pub use probe::{find_gaps, ledger_range};

//! Wire contract for duet.
//!
//! Requests are JSON objects naming a `command` plus parameters. Responses
//! may or may not be wrapped in a `"result"` object and spell the
//! continuation token either `"cursor"` or `"marker"`. This crate owns that
//! contract: the [`endpoints`] table says where each operation keeps its
//! items, [`RequestBuilder`] produces page requests, and [`normalize`] is the
//! single place response shapes are interpreted.

pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod request;

pub use endpoint::{descriptor, endpoints, EndpointDescriptor, EndpointKind, PayloadShape};
pub use envelope::{is_error_response, normalize, unwrap_result, Envelope, ServerFault};
pub use error::{ProtocolError, ProtocolResult};
pub use request::RequestBuilder;

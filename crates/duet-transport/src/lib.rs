//! Transport collaborator for duet.
//!
//! A session is a bidirectional JSON message channel to one server. Each
//! crawl, stream side, and load worker owns its session exclusively and
//! obtains it from a [`Connector`].

pub mod address;
pub mod error;
pub mod memory;
pub mod shutdown;
pub mod transport;
pub mod websocket;

pub use address::ServerAddress;
pub use error::{TransportError, TransportResult};
pub use memory::{MemoryConnector, MemoryTransport, RequestLog};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use transport::{Connector, Transport};
pub use websocket::{WebSocketConnector, WebSocketOptions, WebSocketTransport};

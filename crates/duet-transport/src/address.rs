use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Where a server listens.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub secure: bool,
}

impl ServerAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            secure: false,
        }
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("127.0.0.1", 8080)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

/// Accepts `ws://host:port`, `wss://host:port`, or bare `host:port`.
/// A scheme without a port uses that scheme's default.
impl FromStr for ServerAddress {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| TransportError::InvalidAddress(format!("{s}: {reason}"));
        let (secure, rest, default_port) = match s.split_once("://") {
            None => (false, s, None),
            Some(("ws", rest)) => (false, rest, Some(80)),
            Some(("wss", rest)) => (true, rest, Some(443)),
            Some((other, _)) => return Err(invalid(&format!("unsupported scheme {other}"))),
        };
        let rest = rest.trim_end_matches('/');
        let (host, port) = match rest.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse::<u16>().map_err(|_| invalid("invalid port"))?;
                (host, port)
            }
            _ => (rest, default_port.ok_or_else(|| invalid("missing port"))?),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() || host.contains('/') {
            return Err(invalid("missing host"));
        }
        Ok(Self::new(host, port).secure(secure))
    }
}

use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Network endpoint of a captured datagram
///
/// Equality and hashing cover the socket address only; the resolved host name is
/// descriptive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub addr: SocketAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl Address {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, host: None }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Host name if resolved, otherwise the IP address
    pub fn host_or_ip(&self) -> String {
        match &self.host {
            Some(host) => host.clone(),
            None => self.addr.ip().to_string(),
        }
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl Eq for Address {}

impl std::hash::Hash for Address {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.addr.hash(state)
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "{} ({})", self.addr, host),
            None => write!(f, "{}", self.addr),
        }
    }
}

/// Order two endpoints so that either direction yields the same pair
pub fn canonical_pair(a: SocketAddr, b: SocketAddr) -> (SocketAddr, SocketAddr) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

use std::fmt;
use std::net::SocketAddr;

use voipmon_capture_core::canonical_pair;

/// Composite endpoint key of a media session
///
/// Both RTP endpoints in canonical order, so reports from either direction land
/// on the same session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MediaKey {
    pub low: SocketAddr,
    pub high: SocketAddr,
}

impl MediaKey {
    pub fn new(a: SocketAddr, b: SocketAddr) -> Self {
        let (low, high) = canonical_pair(a, b);
        Self { low, high }
    }
}

impl fmt::Display for MediaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.low, self.high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_ignores_direction() {
        let a: SocketAddr = "10.0.0.1:40000".parse().unwrap();
        let b: SocketAddr = "10.0.0.2:50000".parse().unwrap();
        let key = MediaKey::new(b, a);
        assert_eq!(key, MediaKey::new(a, b));
        assert_eq!(key.low, a);
        assert_eq!(key.to_string(), "10.0.0.1:40000<->10.0.0.2:50000");
    }
}

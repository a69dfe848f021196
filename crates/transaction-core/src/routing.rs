//! Destination of expired transactions
//!
//! Methods with a downstream aggregator are sharded by Call-ID so every
//! transaction of one call lands on the same shard. Everything else is persisted
//! by the engine itself.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

/// Downstream aggregator family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteGroup {
    Call,
    Register,
    Notify,
    Message,
    Options,
    Subscribe,
}

/// Methods that belong to a call dialog
pub const CALL_METHODS: &[&str] = &["INVITE", "BYE", "PRACK", "UPDATE", "INFO", "REFER"];

impl RouteGroup {
    /// Group of a method, `None` when it is persisted directly
    pub fn of(method: &str) -> Option<Self> {
        match method {
            "REGISTER" => Some(RouteGroup::Register),
            "NOTIFY" => Some(RouteGroup::Notify),
            "MESSAGE" => Some(RouteGroup::Message),
            "OPTIONS" => Some(RouteGroup::Options),
            "SUBSCRIBE" => Some(RouteGroup::Subscribe),
            m if CALL_METHODS.contains(&m) => Some(RouteGroup::Call),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteGroup::Call => "call",
            RouteGroup::Register => "register",
            RouteGroup::Notify => "notify",
            RouteGroup::Message => "message",
            RouteGroup::Options => "options",
            RouteGroup::Subscribe => "subscribe",
        }
    }
}

impl fmt::Display for RouteGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shard index for a Call-ID
pub fn shard_for(call_id: &str, instances: usize) -> usize {
    if instances <= 1 {
        return 0;
    }
    let mut hasher = DefaultHasher::new();
    call_id.hash(&mut hasher);
    (hasher.finish() % instances as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_groups() {
        assert_eq!(RouteGroup::of("INVITE"), Some(RouteGroup::Call));
        assert_eq!(RouteGroup::of("REFER"), Some(RouteGroup::Call));
        assert_eq!(RouteGroup::of("REGISTER"), Some(RouteGroup::Register));
        assert_eq!(RouteGroup::of("OPTIONS"), Some(RouteGroup::Options));
        assert_eq!(RouteGroup::of("PUBLISH"), None);
    }

    #[test]
    fn test_shard_is_stable_and_bounded() {
        for call_id in ["a84b4c76e66710", "843817637684230@998sdasdh09", ""] {
            let shard = shard_for(call_id, 4);
            assert!(shard < 4);
            assert_eq!(shard, shard_for(call_id, 4));
        }
        assert_eq!(shard_for("anything", 1), 0);
        assert_eq!(shard_for("anything", 0), 0);
    }
}

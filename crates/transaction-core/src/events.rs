use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::routing::RouteGroup;
use crate::sdp::SessionDescription;
use crate::transaction::SipTransaction;

/// Offer/answer pair negotiated by an INVITE transaction
///
/// `records[0]` is the offer, `records[1]` the answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SdpSessionEvent {
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
    pub records: Vec<SessionDescription>,
}

/// Signaling activity on a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepAlive {
    pub call_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Expired transaction handed to a downstream aggregation shard
#[derive(Debug, Clone)]
pub struct RoutedTransaction {
    pub shard: usize,
    pub group: RouteGroup,
    pub transaction: SipTransaction,
}

//! SIP transaction tracking for voipmon
//!
//! Passively reconstructs SIP transactions from captured packets: requests are
//! paired with their responses, lifetimes are bounded by timeouts, and expired
//! transactions are routed either to per-call aggregation shards or straight to
//! persistence. INVITE offer/answer exchanges are turned into SDP session events
//! for media correlation.

pub mod engine;
pub mod error;
pub mod events;
pub mod routing;
pub mod sdp;
pub mod transaction;

pub use engine::{TransactionEngine, TransactionOutputs, TRANSACTION_COLLECTION};
pub use error::{Result, TransactionError};
pub use events::{KeepAlive, RoutedTransaction, SdpSessionEvent};
pub use routing::{shard_for, RouteGroup};
pub use sdp::{Codec, SessionDescription};
pub use transaction::{SipTransaction, TransactionKey, TransactionOutcome, TransactionState};

//! Hand-off between pipeline stages
//!
//! Stages exchange immutable values (decoded packets, SDP events, RTP reports)
//! through [`bounded`] queues. Senders never wait: when a queue is full the oldest
//! entry is discarded and counted, so a slow consumer cannot stall the correlation
//! path of the producer.

pub mod queue;

pub use queue::{bounded, EventReceiver, EventSender, QueueProbe, QueueStats};

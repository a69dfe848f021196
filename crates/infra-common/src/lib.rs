//! Common infrastructure components for the voipmon workspace
//!
//! Every correlation component (capture decoding, RTCP tracking, SIP transactions,
//! media aggregation) leans on the same small set of ambient services:
//!
//! - [`errors`]: shared error type and context helpers
//! - [`logging`]: `tracing` subscriber setup
//! - [`config`]: the monitor configuration surface and its validation
//! - [`events`]: bounded hand-off queues between pipeline stages
//! - [`sink`]: persistence and metrics sinks (fire-and-forget)
//! - [`time`]: the clock used by periodic sweeps

pub mod config;
pub mod errors;
pub mod events;
pub mod logging;
pub mod sink;
pub mod time;

pub use errors::{Error, Result};

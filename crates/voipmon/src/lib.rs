//! voipmon: passive VoIP traffic monitor
//!
//! Wires the correlation components into a running pipeline:
//!
//! - [`pipeline`]: queues, workers and the [`PipelineHandle`] used to feed and
//!   stop them
//! - [`workers`]: the per-component task loops and their sweeps
//! - [`listener`]: the UDP capture listener used by the binary

pub mod listener;
pub mod pipeline;
pub mod workers;

pub use listener::CaptureListener;
pub use pipeline::{start, CaptureIngress, PipelineHandle};

//! Output sinks
//!
//! Finished transactions, RTCP reports and media sessions leave the core through a
//! [`PersistenceSink`]; counters and timings through a [`MetricsSink`]. Both are
//! fire-and-forget: the correlation path never waits on them and never retries.

pub mod metrics;
pub mod persistence;

pub use metrics::{
    attributes, Attributes, MetricKey, MetricsRegistry, MetricsSink, MetricsSnapshot, NoopMetrics,
    Summary,
};
pub use persistence::{
    collection_name, render_time_suffix, Document, DocumentWriter, LogWriter, MemoryPersistence,
    PersistenceSink, QueuedPersistence,
};

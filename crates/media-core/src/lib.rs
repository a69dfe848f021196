//! Media session aggregation for voipmon
//!
//! Joins what signaling negotiated (SDP offer/answer endpoints) with what the
//! media streams reported (RTP and RTCP quality reports) into one bidirectional
//! record per call leg. Sessions carry no end signal: they are closed after an
//! idle period, then finalized with their derived quality fields and persisted.
//!
//! ```
//! use std::sync::Arc;
//! use voipmon_infra_common::config::MediaConfig;
//! use voipmon_infra_common::sink::{MemoryPersistence, NoopMetrics};
//! use voipmon_media_core::MediaAggregator;
//!
//! let persistence = Arc::new(MemoryPersistence::new());
//! let mut aggregator = MediaAggregator::new(MediaConfig::default(), "%Y%m%d", persistence, Arc::new(NoopMetrics));
//! assert!(aggregator.is_empty());
//! assert_eq!(aggregator.shutdown_flush(), 0);
//! ```

pub mod aggregator;
pub mod error;
pub mod session;

pub use aggregator::{MediaAggregator, SESSION_COLLECTION};
pub use error::{MediaError, Result};
pub use session::{Direction, MediaKey, MediaSession, StreamStats};

//! RTCP session tracking
//!
//! Sender Reports carry cumulative counters. The tracker keeps the previous report
//! block per stream and turns each new one into interval statistics: expected,
//! lost and received packets, loss ratio and the NTP-measured interval length.

pub mod tracker;

pub use tracker::{RtcpSession, RtcpSessionKey, RtcpTracker, MAX_JITTER, REPORT_COLLECTION};

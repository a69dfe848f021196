//! RTCP processing for voipmon
//!
//! - [`packet::rtcp`]: compound packet decoding (Sender Reports and their report
//!   blocks, NTP timestamps)
//! - [`session`]: the RTCP session tracker turning cumulative counters into
//!   per-interval [`RtpReport`]s
//! - [`report`]: the RTP report event shared with the media aggregator
//! - [`quality`]: R-factor and MOS estimation

pub mod error;
pub mod packet;
pub mod quality;
pub mod report;
pub mod session;

pub use error::{Result, RtcpError};
pub use packet::rtcp::{
    decode_compound, NtpTimestamp, RtcpHeader, RtcpReportBlock, RtcpSenderReport,
};
pub use report::{ReportSource, RtpReport};
pub use session::{RtcpSession, RtcpSessionKey, RtcpTracker};

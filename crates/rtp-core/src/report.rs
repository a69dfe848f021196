use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use voipmon_capture_core::Address;

/// Where an RTP report came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    /// Produced by an RTP stream analyzer
    Rtp,
    /// Derived from RTCP Sender Reports
    Rtcp,
}

impl ReportSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportSource::Rtp => "rtp",
            ReportSource::Rtcp => "rtcp",
        }
    }
}

/// Quality report for one RTP stream over one interval
///
/// `src` is the stream sender and `dst` its receiver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RtpReport {
    pub source: ReportSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub src: Address,
    pub dst: Address,
    pub ssrc: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    pub expected_packets: u32,
    pub received_packets: u32,
    pub lost_packets: u32,
    /// Ratio in `[0, 1]`
    pub fraction_lost: f32,

    pub last_jitter: f32,
    pub avg_jitter: f32,
    pub min_jitter: f32,
    pub max_jitter: f32,

    /// Interval length in milliseconds
    pub duration_ms: u64,
    pub r_factor: f32,
    pub mos: f32,

    /// Start of the reported interval
    pub started_at: DateTime<Utc>,
    /// When the report was produced
    pub created_at: DateTime<Utc>,
}

impl RtpReport {
    /// Empty report for a stream
    pub fn new(
        source: ReportSource,
        src: Address,
        dst: Address,
        ssrc: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            source,
            call_id: None,
            src,
            dst,
            ssrc,
            payload_type: None,
            codec: None,
            expected_packets: 0,
            received_packets: 0,
            lost_packets: 0,
            fraction_lost: 0.0,
            last_jitter: 0.0,
            avg_jitter: 0.0,
            min_jitter: 0.0,
            max_jitter: 0.0,
            duration_ms: 0,
            r_factor: 0.0,
            mos: 0.0,
            started_at: created_at,
            created_at,
        }
    }

    pub fn with_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id.into());
        self
    }

    /// Set every jitter statistic to one observation
    pub fn set_jitter(&mut self, jitter: f32) {
        self.last_jitter = jitter;
        self.avg_jitter = jitter;
        self.min_jitter = jitter;
        self.max_jitter = jitter;
    }
}

use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use voipmon_rtp_core::{ReportSource, RtpReport};

use super::key::MediaKey;

/// Which way a stream flows relative to the session orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From `src` to `dst`
    Forward,
    /// From `dst` to `src`
    Reverse,
}

/// Reports of one stream folded together
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StreamStats {
    pub ssrc: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_type: Option<u8>,
    pub report_count: u32,
    pub expected_packets: u64,
    pub received_packets: u64,
    pub lost_packets: u64,
    /// Loss over the whole stream
    pub fraction_lost: f32,
    pub last_jitter: f32,
    pub avg_jitter: f32,
    pub min_jitter: f32,
    pub max_jitter: f32,
    /// Lowest positive R-factor
    pub min_r_factor: f32,
    pub avg_r_factor: f32,
    pub avg_mos: f32,
    pub duration_ms: u64,
}

impl StreamStats {
    fn fold(&mut self, report: &RtpReport) {
        let first = self.report_count == 0;
        self.report_count += 1;
        let n = self.report_count as f32;

        self.ssrc = report.ssrc;
        if report.payload_type.is_some() {
            self.payload_type = report.payload_type;
        }

        self.expected_packets += u64::from(report.expected_packets);
        self.received_packets += u64::from(report.received_packets);
        self.lost_packets += u64::from(report.lost_packets);
        self.fraction_lost = if self.expected_packets == 0 {
            0.0
        } else {
            self.lost_packets as f32 / self.expected_packets as f32
        };

        self.last_jitter = report.last_jitter;
        self.avg_jitter += (report.avg_jitter - self.avg_jitter) / n;
        if first {
            self.min_jitter = report.min_jitter;
            self.max_jitter = report.max_jitter;
        } else {
            self.min_jitter = self.min_jitter.min(report.min_jitter);
            self.max_jitter = self.max_jitter.max(report.max_jitter);
        }

        if report.r_factor > 0.0
            && (self.min_r_factor == 0.0 || report.r_factor < self.min_r_factor)
        {
            self.min_r_factor = report.r_factor;
        }
        self.avg_r_factor += (report.r_factor - self.avg_r_factor) / n;
        self.avg_mos += (report.mos - self.avg_mos) / n;

        self.duration_ms += report.duration_ms;
    }
}

/// Bidirectional media session of one call
///
/// Created either from an SDP offer/answer or from the first report on an
/// unknown endpoint pair. Finalized once after it has been idle for the
/// aggregation timeout.
#[derive(Debug, Clone, Serialize)]
pub struct MediaSession {
    pub call_id: String,
    #[serde(skip)]
    pub key: MediaKey,
    /// Offerer's RTP endpoint
    pub src: SocketAddr,
    /// Answerer's RTP endpoint
    pub dst: SocketAddr,

    pub created_at: DateTime<Utc>,
    /// Latest report or signaling activity
    pub alive_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_rtp: Option<StreamStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_rtp: Option<StreamStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward_rtcp: Option<StreamStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_rtcp: Option<StreamStats>,

    pub report_count: u32,
    pub bad_report_count: u32,
    /// Longest stream duration, milliseconds
    pub duration_ms: u64,
    pub one_way: bool,

    /// Earliest interval start claimed by a report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_started_at: Option<DateTime<Utc>>,
    /// Latest report production time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_ended_at: Option<DateTime<Utc>>,
    /// `created_at - reported_started_at`, milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_diff_ms: Option<i64>,
    /// `terminated_at - reported_ended_at`, milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_diff_ms: Option<i64>,
}

impl MediaSession {
    pub fn new(
        call_id: impl Into<String>,
        src: SocketAddr,
        dst: SocketAddr,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            key: MediaKey::new(src, dst),
            src,
            dst,
            created_at,
            alive_at: created_at,
            terminated_at: None,
            codec: None,
            forward_rtp: None,
            reverse_rtp: None,
            forward_rtcp: None,
            reverse_rtcp: None,
            report_count: 0,
            bad_report_count: 0,
            duration_ms: 0,
            one_way: false,
            reported_started_at: None,
            reported_ended_at: None,
            created_diff_ms: None,
            terminated_diff_ms: None,
        }
    }

    /// Direction of a stream sent from `sender`
    pub fn direction_of(&self, sender: &SocketAddr) -> Direction {
        if *sender == self.src {
            Direction::Forward
        } else {
            Direction::Reverse
        }
    }

    /// Refresh the alive time, never moving it backwards
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.alive_at {
            self.alive_at = at;
        }
    }

    pub fn is_idle(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        self.alive_at + timeout <= now
    }

    /// Fold a report into the matching sub-record
    ///
    /// Returns whether the report counts as bad, that is a positive R-factor
    /// below `r_factor_threshold`.
    pub fn fold_report(&mut self, report: &RtpReport, r_factor_threshold: f64) -> bool {
        let direction = self.direction_of(&report.src.addr);
        let slot = match (report.source, direction) {
            (ReportSource::Rtp, Direction::Forward) => &mut self.forward_rtp,
            (ReportSource::Rtp, Direction::Reverse) => &mut self.reverse_rtp,
            (ReportSource::Rtcp, Direction::Forward) => &mut self.forward_rtcp,
            (ReportSource::Rtcp, Direction::Reverse) => &mut self.reverse_rtcp,
        };
        slot.get_or_insert_with(StreamStats::default).fold(report);

        if self.codec.is_none() {
            self.codec = report.codec.clone();
        }

        self.report_count += 1;
        let r_factor = f64::from(report.r_factor);
        let bad = r_factor > 0.0 && r_factor < r_factor_threshold;
        if bad {
            self.bad_report_count += 1;
        }

        self.reported_started_at = Some(match self.reported_started_at {
            Some(at) if at <= report.started_at => at,
            _ => report.started_at,
        });
        self.reported_ended_at = Some(match self.reported_ended_at {
            Some(at) if at >= report.created_at => at,
            _ => report.created_at,
        });
        self.duration_ms = self.longest_stream_ms();
        self.touch(report.created_at);
        bad
    }

    fn streams(&self) -> impl Iterator<Item = &StreamStats> {
        [&self.forward_rtp, &self.reverse_rtp, &self.forward_rtcp, &self.reverse_rtcp]
            .into_iter()
            .flatten()
    }

    fn longest_stream_ms(&self) -> u64 {
        self.streams().map(|s| s.duration_ms).max().unwrap_or(0)
    }

    /// Settle the derived quality fields before persisting
    pub fn finalize(&mut self) {
        let terminated_at = self.alive_at;
        self.terminated_at = Some(terminated_at);

        let forward = self.forward_rtp.is_some() || self.forward_rtcp.is_some();
        let reverse = self.reverse_rtp.is_some() || self.reverse_rtcp.is_some();
        self.one_way = forward != reverse;
        self.duration_ms = self.longest_stream_ms();

        self.created_diff_ms = self
            .reported_started_at
            .map(|at| (self.created_at - at).num_milliseconds());
        self.terminated_diff_ms = self
            .reported_ended_at
            .map(|at| (terminated_at - at).num_milliseconds());
    }
}

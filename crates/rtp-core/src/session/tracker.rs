use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use voipmon_capture_core::{canonical_pair, Packet};
use voipmon_infra_common::config::RtcpConfig;
use voipmon_infra_common::sink::{
    attributes, collection_name, Document, MetricsSink, PersistenceSink,
};

use crate::error::Result;
use crate::packet::rtcp::{decode_compound, NtpTimestamp, RtcpReportBlock, RtcpSenderReport};
use crate::quality;
use crate::report::{ReportSource, RtpReport};

/// Jitter readings at or above this are discarded
pub const MAX_JITTER: u32 = 10_000;

/// Collection prefix for RTCP-derived reports
pub const REPORT_COLLECTION: &str = "rtcp_report";

/// Direction-agnostic stream key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RtcpSessionKey {
    pub low: SocketAddr,
    pub high: SocketAddr,
    pub ssrc: u32,
}

impl RtcpSessionKey {
    pub fn new(a: SocketAddr, b: SocketAddr, ssrc: u32) -> Self {
        let (low, high) = canonical_pair(a, b);
        Self { low, high, ssrc }
    }
}

/// State kept between two reports on one stream
#[derive(Debug, Clone)]
pub struct RtcpSession {
    pub created_at: DateTime<Utc>,
    /// Capture time of the latest report
    pub updated_at: DateTime<Utc>,
    /// Last plausible jitter, in timestamp units
    pub last_jitter: u32,
    pub last_ntp: NtpTimestamp,
    pub last_highest_seq: u32,
    pub last_cumulative_lost: u32,
}

/// Owns the RTCP session map
pub struct RtcpTracker {
    config: RtcpConfig,
    time_suffix: String,
    sessions: HashMap<RtcpSessionKey, RtcpSession>,
    persistence: Arc<dyn PersistenceSink>,
    metrics: Arc<dyn MetricsSink>,
}

impl RtcpTracker {
    pub fn new(
        config: RtcpConfig,
        time_suffix: impl Into<String>,
        persistence: Arc<dyn PersistenceSink>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            time_suffix: time_suffix.into(),
            sessions: HashMap::new(),
            persistence,
            metrics,
        }
    }

    /// Decode an RTCP compound payload and fold every Sender Report
    ///
    /// Returns the reports emitted, one per report block. They are already
    /// persisted; the caller forwards them to the media aggregator.
    pub fn handle(&mut self, packet: &Packet) -> Result<Vec<RtpReport>> {
        let sender_reports = decode_compound(&packet.payload)?;

        let mut reports = Vec::new();
        for sr in &sender_reports {
            reports.extend(self.on_sender_report(packet, sr));
        }
        Ok(reports)
    }

    /// Fold one Sender Report received in `packet`
    pub fn on_sender_report(&mut self, packet: &Packet, sr: &RtcpSenderReport) -> Vec<RtpReport> {
        let mut reports = Vec::with_capacity(sr.report_blocks.len());
        for block in &sr.report_blocks {
            let report = self.on_report_block(packet, sr, block);
            self.persist(&report);
            reports.push(report);
        }
        reports
    }

    fn on_report_block(
        &mut self,
        packet: &Packet,
        sr: &RtcpSenderReport,
        block: &RtcpReportBlock,
    ) -> RtpReport {
        let key = RtcpSessionKey::new(packet.src.addr, packet.dst.addr, block.ssrc);

        // The reporter receives the stream described by the block
        let mut report = RtpReport::new(
            ReportSource::Rtcp,
            packet.dst.clone(),
            packet.src.clone(),
            block.ssrc,
            packet.timestamp,
        );

        match self.sessions.get_mut(&key) {
            Some(session) => {
                let interval =
                    block.interval_since(session.last_highest_seq, session.last_cumulative_lost);

                report.expected_packets = interval.expected;
                report.lost_packets = interval.lost;
                report.received_packets = interval.received();
                report.duration_ms = sr.ntp_timestamp.millis_since(&session.last_ntp);
                report.started_at = session.updated_at;

                match block.jitter_below(MAX_JITTER) {
                    Some(jitter) => session.last_jitter = jitter,
                    None => trace!(
                        ssrc = block.ssrc,
                        jitter = block.jitter,
                        "Discarding implausible jitter"
                    ),
                }
                session.last_ntp = sr.ntp_timestamp;
                session.last_highest_seq = block.highest_seq;
                session.last_cumulative_lost = block.cumulative_lost;
                session.updated_at = packet.timestamp;

                report.set_jitter(session.last_jitter as f32);
            }
            None => {
                let received = sr.sender_packet_count;
                let lost = block.cumulative_lost;

                report.received_packets = received;
                report.lost_packets = lost;
                report.expected_packets = received.saturating_add(lost);

                let session = RtcpSession {
                    created_at: packet.timestamp,
                    updated_at: packet.timestamp,
                    last_jitter: block.jitter_below(MAX_JITTER).unwrap_or(0),
                    last_ntp: sr.ntp_timestamp,
                    last_highest_seq: block.highest_seq,
                    last_cumulative_lost: block.cumulative_lost,
                };
                report.set_jitter(session.last_jitter as f32);
                debug!(ssrc = block.ssrc, src = %packet.src, dst = %packet.dst, "New RTCP session");
                self.sessions.insert(key, session);
            }
        }

        report.fraction_lost = if report.expected_packets == 0 {
            0.0
        } else {
            report.lost_packets as f32 / report.expected_packets as f32
        };
        report.r_factor = quality::r_factor(
            report.fraction_lost,
            quality::jitter_millis(report.last_jitter, quality::DEFAULT_CLOCK_RATE),
        );
        report.mos = quality::mos(report.r_factor);

        report
    }

    fn persist(&self, report: &RtpReport) {
        self.metrics
            .counter("rtcp_reports", 1, &attributes([("source", ReportSource::Rtcp.as_str())]));

        let collection = collection_name(REPORT_COLLECTION, report.created_at, &self.time_suffix);
        match Document::from_record(collection, report) {
            Ok(document) => self.persistence.write(document),
            Err(e) => warn!("Failed to persist RTCP report: {}", e),
        }
    }

    /// Remove sessions idle for the aggregation timeout
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = self.config.aggregation_timeout();
        let expired: Vec<RtcpSessionKey> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.updated_at + timeout <= now)
            .map(|(key, _)| *key)
            .collect();

        for key in &expired {
            self.sessions.remove(key);
        }
        if !expired.is_empty() {
            debug!("Expired {} RTCP sessions", expired.len());
        }
        expired.len()
    }

    /// Drop every session
    pub fn shutdown_flush(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }

    pub fn session(&self, key: &RtcpSessionKey) -> Option<&RtcpSession> {
        self.sessions.get(key)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl std::fmt::Debug for RtcpTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtcpTracker")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

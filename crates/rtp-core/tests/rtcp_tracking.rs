//! End-to-end RTCP tracking: wire bytes in, persisted reports out

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use voipmon_capture_core::{Address, Packet, ProtocolCode};
use voipmon_infra_common::config::RtcpConfig;
use voipmon_infra_common::sink::{MemoryPersistence, MetricsRegistry};
use voipmon_rtp_core::{NtpTimestamp, ReportSource, RtcpReportBlock, RtcpSenderReport, RtcpTracker};

const NTP_BASE: u32 = 3_913_056_000;

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap()
}

fn sender_report(ntp_offset: u32, lost: u32, seq: u32) -> Vec<u8> {
    let mut sr = RtcpSenderReport::new(0xCAFE);
    sr.ntp_timestamp = NtpTimestamp::new(NTP_BASE + ntp_offset, 0);
    sr.sender_packet_count = 950;
    let mut block = RtcpReportBlock::new(100);
    block.cumulative_lost = lost;
    block.highest_seq = seq;
    block.jitter = 24;
    sr.add_report_block(block);
    sr.serialize().to_vec()
}

fn rtcp_packet(payload: Vec<u8>, at: DateTime<Utc>) -> Packet {
    Packet::new(
        Address::new("192.168.10.5:20001".parse().unwrap()),
        Address::new("192.168.20.7:30001".parse().unwrap()),
        at,
        ProtocolCode::Rtcp,
        payload,
    )
}

#[test]
fn two_sender_reports_produce_interval_loss() {
    let persistence = Arc::new(MemoryPersistence::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let mut tracker = RtcpTracker::new(
        RtcpConfig::default(),
        "%Y%m%d",
        persistence.clone(),
        metrics.clone(),
    );

    let first = tracker.handle(&rtcp_packet(sender_report(0, 5, 1000), start())).unwrap();
    let second = tracker
        .handle(&rtcp_packet(sender_report(5, 7, 1050), start() + Duration::seconds(5)))
        .unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 1);

    let report = &second[0];
    assert_eq!(report.source, ReportSource::Rtcp);
    assert_eq!(report.ssrc, 100);
    assert_eq!(report.expected_packets, 50);
    assert_eq!(report.lost_packets, 2);
    assert_eq!(report.received_packets, 48);
    assert!((report.fraction_lost - 0.04).abs() < 1e-6);
    assert_eq!(report.duration_ms, 5000);

    let documents = persistence.documents();
    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].collection, "rtcp_report_20240101");
    assert_eq!(documents[1].body["lost_packets"], 2);
    assert_eq!(documents[1].body["source"], "rtcp");

    assert_eq!(metrics.snapshot().counter_total("rtcp_reports"), 2);
}

#[test]
fn truncated_compound_keeps_leading_report() {
    let persistence = Arc::new(MemoryPersistence::new());
    let mut tracker = RtcpTracker::new(
        RtcpConfig::default(),
        "%Y%m%d",
        persistence.clone(),
        Arc::new(MetricsRegistry::new()),
    );

    let mut payload = sender_report(0, 5, 1000);
    let tail = sender_report(1, 6, 1010);
    payload.extend_from_slice(&tail[..tail.len() / 2]);

    let reports = tracker.handle(&rtcp_packet(payload, start())).unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(persistence.len(), 1);
}

#[test]
fn shutdown_drops_sessions_without_persisting() {
    let persistence = Arc::new(MemoryPersistence::new());
    let mut tracker = RtcpTracker::new(
        RtcpConfig::default(),
        "%Y%m%d",
        persistence.clone(),
        Arc::new(MetricsRegistry::new()),
    );
    tracker.handle(&rtcp_packet(sender_report(0, 5, 1000), start())).unwrap();

    assert_eq!(tracker.shutdown_flush(), 1);
    assert!(tracker.is_empty());
    assert_eq!(persistence.len(), 1);
}

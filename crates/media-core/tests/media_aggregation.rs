//! Media aggregation from SDP events and RTP reports to persisted sessions

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use voipmon_capture_core::Address;
use voipmon_infra_common::config::MediaConfig;
use voipmon_infra_common::sink::{attributes, MemoryPersistence, MetricsRegistry};
use voipmon_media_core::{MediaAggregator, MediaError, MediaKey};
use voipmon_rtp_core::{ReportSource, RtpReport};
use voipmon_transaction_core::{Codec, SdpSessionEvent, SessionDescription};

const CALLER_RTP: &str = "10.0.0.1:40000";
const CALLEE_RTP: &str = "10.0.0.2:50000";

fn start() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap()
}

fn sdp(address: &str) -> SessionDescription {
    SessionDescription {
        address: address.parse().unwrap(),
        codecs: vec![Codec {
            payload_type: 8,
            name: "PCMA".into(),
            clock_rate: 8000,
        }],
        ptime: Some(20),
    }
}

fn sdp_event(call_id: &str, records: Vec<SessionDescription>) -> SdpSessionEvent {
    SdpSessionEvent {
        call_id: call_id.into(),
        timestamp: start(),
        records,
    }
}

fn rtp_report(
    src: &str,
    dst: &str,
    call_id: Option<&str>,
    r_factor: f32,
    at: DateTime<Utc>,
) -> RtpReport {
    let mut report = RtpReport::new(
        ReportSource::Rtp,
        Address::new(src.parse().unwrap()),
        Address::new(dst.parse().unwrap()),
        0x1234,
        at,
    );
    report.call_id = call_id.map(str::to_string);
    report.expected_packets = 250;
    report.received_packets = 250;
    report.duration_ms = 5000;
    report.r_factor = r_factor;
    report.started_at = at - Duration::seconds(5);
    report
}

fn new_aggregator(
    config: MediaConfig,
) -> (MediaAggregator, Arc<MemoryPersistence>, Arc<MetricsRegistry>) {
    let persistence = Arc::new(MemoryPersistence::new());
    let metrics = Arc::new(MetricsRegistry::new());
    let aggregator = MediaAggregator::new(config, "%Y%m%d", persistence.clone(), metrics.clone());
    (aggregator, persistence, metrics)
}

fn key() -> MediaKey {
    MediaKey::new(CALLER_RTP.parse().unwrap(), CALLEE_RTP.parse().unwrap())
}

#[test]
fn sdp_event_creates_exactly_one_session() {
    let (mut aggregator, _, _) = new_aggregator(MediaConfig::default());

    assert!(aggregator.on_sdp(&sdp_event("c1", vec![sdp(CALLER_RTP), sdp(CALLEE_RTP)])).unwrap());
    assert!(!aggregator.on_sdp(&sdp_event("c1", vec![sdp(CALLER_RTP), sdp(CALLEE_RTP)])).unwrap());

    assert_eq!(aggregator.len(), 1);
    let session = aggregator.session("c1", &key()).unwrap();
    assert_eq!(session.src, CALLER_RTP.parse().unwrap());
    assert_eq!(session.codec.as_deref(), Some("PCMA"));
}

#[test]
fn sdp_event_with_wrong_record_count_is_rejected() {
    let (mut aggregator, _, _) = new_aggregator(MediaConfig::default());

    let err = aggregator.on_sdp(&sdp_event("c1", vec![sdp(CALLER_RTP)])).unwrap_err();
    assert_eq!(err, MediaError::InvalidSdpRecordCount(1));
    assert!(err.is_invariant_violation());

    let err = aggregator
        .on_sdp(&sdp_event("c1", vec![sdp(CALLER_RTP), sdp(CALLEE_RTP), sdp("10.0.0.3:1000")]))
        .unwrap_err();
    assert_eq!(err, MediaError::InvalidSdpRecordCount(3));
    assert!(aggregator.is_empty());
}

#[test]
fn session_without_reports_is_dropped_unpersisted() {
    let (mut aggregator, persistence, _) = new_aggregator(MediaConfig::default());
    aggregator.on_sdp(&sdp_event("c1", vec![sdp(CALLER_RTP), sdp(CALLEE_RTP)])).unwrap();

    assert_eq!(aggregator.expire(start() + Duration::seconds(30)), 0);
    assert!(aggregator.is_empty());
    assert_eq!(aggregator.call_count(), 0);
    assert!(persistence.documents().is_empty());
}

#[test]
fn reported_session_is_persisted_once() {
    let (mut aggregator, persistence, metrics) = new_aggregator(MediaConfig::default());
    aggregator.on_sdp(&sdp_event("c1", vec![sdp(CALLER_RTP), sdp(CALLEE_RTP)])).unwrap();

    let t1 = start() + Duration::seconds(5);
    let t2 = start() + Duration::seconds(10);
    aggregator.on_rtp_report(&rtp_report(CALLER_RTP, CALLEE_RTP, None, 92.0, t1)).unwrap();
    aggregator.on_rtp_report(&rtp_report(CALLEE_RTP, CALLER_RTP, None, 70.0, t1)).unwrap();
    aggregator.on_rtp_report(&rtp_report(CALLER_RTP, CALLEE_RTP, Some("c1"), 91.0, t2)).unwrap();

    // Alive until t2 + 30s
    assert_eq!(aggregator.expire(t2 + Duration::seconds(29)), 0);
    assert_eq!(aggregator.expire(t2 + Duration::seconds(30)), 1);
    assert_eq!(aggregator.expire(t2 + Duration::seconds(90)), 0);
    assert_eq!(aggregator.shutdown_flush(), 0);

    let documents = persistence.with_prefix("media_session");
    assert_eq!(documents.len(), 1);
    let body = &documents[0].body;
    assert_eq!(documents[0].collection, "media_session_20240101");
    assert_eq!(body["call_id"], "c1");
    assert_eq!(body["report_count"], 3);
    assert_eq!(body["bad_report_count"], 1);
    assert_eq!(body["duration_ms"], 10000);
    assert_eq!(body["one_way"], false);
    assert_eq!(body["forward_rtp"]["report_count"], 2);
    assert_eq!(body["reverse_rtp"]["report_count"], 1);
    assert_eq!(body["terminated_at"], serde_json::to_value(t2).unwrap());

    let snapshot = metrics.snapshot();
    let attrs = attributes([("one_way", "false")]);
    assert_eq!(snapshot.counter("media_sessions_finalized", &attrs), 1);
    assert_eq!(snapshot.summary("media_report_count", &attrs).unwrap().sum, 3.0);
    assert_eq!(snapshot.summary("media_bad_report_count", &attrs).unwrap().sum, 1.0);
}

#[test]
fn report_without_call_id_needs_sdp_endpoints() {
    let (mut aggregator, _, _) = new_aggregator(MediaConfig::default());

    let err = aggregator
        .on_rtp_report(&rtp_report(CALLER_RTP, CALLEE_RTP, None, 90.0, start()))
        .unwrap_err();
    assert_eq!(err, MediaError::MissingCallId);
    assert!(aggregator.is_empty());
}

#[test]
fn report_with_call_id_creates_session_from_receiver_side() {
    let (mut aggregator, _, _) = new_aggregator(MediaConfig::default());
    aggregator
        .on_rtp_report(&rtp_report(CALLEE_RTP, CALLER_RTP, Some("c7"), 90.0, start()))
        .unwrap();

    let session = aggregator.session("c7", &key()).unwrap();
    assert_eq!(session.src, CALLER_RTP.parse().unwrap());
    assert!(session.reverse_rtp.is_some());
    assert!(session.forward_rtp.is_none());
}

#[test]
fn rtcp_reports_follow_configuration() {
    let (mut aggregator, _, _) = new_aggregator(MediaConfig::default());
    let mut report = rtp_report(CALLER_RTP, CALLEE_RTP, Some("c1"), 90.0, start());
    report.source = ReportSource::Rtcp;
    assert_eq!(aggregator.on_rtp_report(&report).unwrap_err(), MediaError::UnsupportedSource);

    let config = MediaConfig {
        rtcp_reports: true,
        ..Default::default()
    };
    let (mut aggregator, _, _) = new_aggregator(config);
    aggregator.on_rtp_report(&report).unwrap();
    let session = aggregator.session("c1", &key()).unwrap();
    assert!(session.reverse_rtcp.is_some());
    assert_eq!(session.report_count, 1);
}

#[test]
fn keep_alive_extends_idle_deadline() {
    let (mut aggregator, persistence, _) = new_aggregator(MediaConfig::default());
    aggregator.on_sdp(&sdp_event("c1", vec![sdp(CALLER_RTP), sdp(CALLEE_RTP)])).unwrap();
    aggregator
        .on_rtp_report(&rtp_report(CALLER_RTP, CALLEE_RTP, None, 90.0, start()))
        .unwrap();

    assert_eq!(aggregator.keep_alive("c1", start() + Duration::seconds(20)), 1);
    assert_eq!(aggregator.keep_alive("unknown", start()), 0);

    assert_eq!(aggregator.expire(start() + Duration::seconds(30)), 0);
    assert_eq!(aggregator.expire(start() + Duration::seconds(50)), 1);

    let documents = persistence.documents();
    assert_eq!(documents[0].body["one_way"], true);
}

#[test]
fn shutdown_flush_persists_reported_sessions_only() {
    let (mut aggregator, persistence, _) = new_aggregator(MediaConfig::default());
    aggregator.on_sdp(&sdp_event("c1", vec![sdp(CALLER_RTP), sdp(CALLEE_RTP)])).unwrap();
    aggregator
        .on_sdp(&sdp_event("c2", vec![sdp("10.0.1.1:4000"), sdp("10.0.1.2:5000")]))
        .unwrap();
    aggregator
        .on_rtp_report(&rtp_report(CALLER_RTP, CALLEE_RTP, None, 90.0, start()))
        .unwrap();

    assert_eq!(aggregator.shutdown_flush(), 1);
    assert!(aggregator.is_empty());
    assert_eq!(persistence.len(), 1);
}

//! Pipeline behaviour end to end: HEP datagrams in, persisted records out

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use voipmon::CaptureListener;
use voipmon_capture_core::{encode_hep, Address, Packet, ProtocolCode};
use voipmon_infra_common::config::MonitorConfig;
use voipmon_infra_common::sink::{MemoryPersistence, MetricsRegistry};
use voipmon_infra_common::time::ManualClock;
use voipmon_rtp_core::{NtpTimestamp, ReportSource, RtcpReportBlock, RtcpSenderReport, RtpReport};

const OFFER: &str = "v=0\r\no=alice 1 1 IN IP4 10.0.0.1\r\ns=-\r\nc=IN IP4 10.0.0.1\r\nt=0 0\r\nm=audio 40000 RTP/AVP 8\r\n";
const ANSWER: &str = "v=0\r\no=bob 1 1 IN IP4 10.0.0.2\r\ns=-\r\nc=IN IP4 10.0.0.2\r\nt=0 0\r\nm=audio 50000 RTP/AVP 8\r\n";

fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_704_067_200, 0).unwrap()
}

fn sip(method: &str, cseq: u32, status: Option<u16>, body: &str) -> String {
    let first_line = match status {
        Some(code) => format!("SIP/2.0 {} OK", code),
        None => format!("{} sip:bob@10.0.0.2 SIP/2.0", method),
    };
    format!(
        "{first_line}\r\n\
         Via: SIP/2.0/UDP 10.0.0.1:5060;branch=z9hG4bK-{cseq}\r\n\
         From: <sip:alice@10.0.0.1>;tag=a1\r\n\
         To: <sip:bob@10.0.0.2>\r\n\
         Call-ID: call-1\r\n\
         CSeq: {cseq} {method}\r\n\
         Content-Length: {len}\r\n\r\n{body}",
        len = body.len()
    )
}

fn hep(text: String, outbound: bool, offset_ms: i64) -> Vec<u8> {
    let caller = Address::new("10.0.0.1:5060".parse().unwrap());
    let callee = Address::new("10.0.0.2:5060".parse().unwrap());
    let (src, dst) = if outbound { (caller, callee) } else { (callee, caller) };
    let packet = Packet::new(
        src,
        dst,
        start_time() + chrono::Duration::milliseconds(offset_ms),
        ProtocolCode::Sip,
        text.into_bytes(),
    );
    encode_hep(&packet).to_vec()
}

fn rtcp_packet() -> Packet {
    let mut sr = RtcpSenderReport::new(0xBEEF);
    sr.ntp_timestamp = NtpTimestamp::new(3_913_056_000, 0);
    sr.sender_packet_count = 500;
    let mut block = RtcpReportBlock::new(0xCAFE);
    block.cumulative_lost = 3;
    block.highest_seq = 600;
    block.jitter = 40;
    sr.add_report_block(block);

    Packet::new(
        Address::new("10.0.0.2:50001".parse().unwrap()),
        Address::new("10.0.0.1:40001".parse().unwrap()),
        start_time(),
        ProtocolCode::Rtcp,
        sr.serialize().to_vec(),
    )
}

fn rtp_report() -> RtpReport {
    let mut report = RtpReport::new(
        ReportSource::Rtp,
        Address::new("10.0.0.1:40000".parse().unwrap()),
        Address::new("10.0.0.2:50000".parse().unwrap()),
        0x1234,
        start_time() + chrono::Duration::seconds(5),
    );
    report.expected_packets = 250;
    report.received_packets = 249;
    report.lost_packets = 1;
    report.duration_ms = 5000;
    report.r_factor = 91.0;
    report.with_call_id("call-1")
}

struct Sinks {
    persistence: Arc<MemoryPersistence>,
    metrics: Arc<MetricsRegistry>,
    clock: ManualClock,
}

fn sinks() -> Sinks {
    Sinks {
        persistence: Arc::new(MemoryPersistence::new()),
        metrics: Arc::new(MetricsRegistry::new()),
        clock: ManualClock::new(start_time()),
    }
}

fn start(config: &MonitorConfig, sinks: &Sinks) -> voipmon::PipelineHandle {
    voipmon::start(
        config,
        Arc::new(sinks.clock.clone()),
        sinks.persistence.clone(),
        sinks.metrics.clone(),
    )
    .unwrap()
}

#[tokio::test]
async fn shutdown_flushes_every_component() {
    let sinks = sinks();
    let pipeline = start(&MonitorConfig::default(), &sinks);

    pipeline.ingest_capture(&hep(sip("INVITE", 1, None, OFFER), true, 0)).unwrap();
    pipeline
        .ingest_capture(&hep(sip("INVITE", 1, Some(200), ANSWER), false, 120))
        .unwrap();
    pipeline.ingest_capture(&hep(sip("BYE", 2, None, ""), true, 9000)).unwrap();
    pipeline
        .ingest_capture(&hep(sip("BYE", 2, Some(200), ""), false, 9040))
        .unwrap();
    assert!(pipeline.ingest_capture(&[0x48, 0x45, 0x50]).is_err());

    pipeline.ingest_rtcp(rtcp_packet());
    pipeline.submit_rtp_report(rtp_report());
    pipeline.keep_alive("call-1", start_time() + chrono::Duration::seconds(10));

    pipeline.shutdown().await;

    let calls = sinks.persistence.with_prefix("sip_call");
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|doc| doc.collection == "sip_call_20240101"));

    let media = sinks.persistence.with_prefix("media_session");
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].body["call_id"], "call-1");
    assert_eq!(media[0].body["report_count"], 1);

    assert_eq!(sinks.persistence.with_prefix("rtcp_report").len(), 1);

    let snapshot = sinks.metrics.snapshot();
    assert_eq!(snapshot.counter_total("hep_packets_decoded"), 4);
    assert_eq!(snapshot.counter_total("hep_packets_rejected"), 1);
    assert_eq!(snapshot.counter_total("sip_transactions_routed"), 2);
    assert_eq!(snapshot.counter_total("media_sessions_finalized"), 1);
}

#[tokio::test]
async fn rtcp_reports_do_not_displace_rtp_reports() {
    let sinks = sinks();
    let config = MonitorConfig {
        queue_capacity: 1,
        ..MonitorConfig::default()
    };
    let pipeline = start(&config, &sinks);

    // Nothing runs before the first await, so both land in one-slot queues
    pipeline.submit_rtp_report(rtp_report());
    pipeline.ingest_rtcp(rtcp_packet());
    pipeline.shutdown().await;

    let media = sinks.persistence.with_prefix("media_session");
    assert_eq!(media.len(), 1);
    assert_eq!(media[0].body["report_count"], 1);
    assert_eq!(sinks.persistence.with_prefix("rtcp_report").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sweep_routes_unanswered_transaction() {
    let sinks = sinks();
    let pipeline = start(&MonitorConfig::default(), &sinks);

    pipeline
        .ingest_capture(&hep(sip("REGISTER", 1, None, ""), true, 0))
        .unwrap();

    // Response timeout is 3s; sweeps run every second
    sinks.clock.advance(chrono::Duration::seconds(4));
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let registers = sinks.persistence.with_prefix("sip_register");
    assert_eq!(registers.len(), 1);
    assert_eq!(registers[0].body["outcome"], "unanswered");

    pipeline.shutdown().await;
    assert_eq!(sinks.persistence.with_prefix("sip_register").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn idle_media_session_is_persisted_by_sweep() {
    let sinks = sinks();
    let pipeline = start(&MonitorConfig::default(), &sinks);

    pipeline.ingest_capture(&hep(sip("INVITE", 1, None, OFFER), true, 0)).unwrap();
    pipeline
        .ingest_capture(&hep(sip("INVITE", 1, Some(200), ANSWER), false, 100))
        .unwrap();
    pipeline.submit_rtp_report(rtp_report());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(sinks.persistence.with_prefix("media_session").is_empty());

    // Aggregation timeout is 30s past the report; sweeps run every 4s
    sinks.clock.advance(chrono::Duration::seconds(40));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(sinks.persistence.with_prefix("media_session").len(), 1);

    pipeline.shutdown().await;
    assert_eq!(sinks.persistence.with_prefix("media_session").len(), 1);
}

#[tokio::test]
async fn udp_listener_feeds_the_pipeline() {
    let sinks = sinks();
    let pipeline = start(&MonitorConfig::default(), &sinks);
    let ingress = pipeline.ingress();

    let listener = CaptureListener::bind("127.0.0.1:0".parse().unwrap(), pipeline.ingress())
        .await
        .unwrap();
    let target = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(listener.run(cancel.clone()));

    let agent = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    agent
        .send_to(&hep(sip("OPTIONS", 1, None, ""), true, 0), target)
        .await
        .unwrap();

    for _ in 0..200 {
        if ingress.decoder().decoded_count() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ingress.decoder().decoded_count(), 1);

    cancel.cancel();
    task.await.unwrap();
    drop(ingress);
    pipeline.shutdown().await;

    assert_eq!(sinks.persistence.with_prefix("sip_options").len(), 1);
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let sinks = sinks();
    let mut config = MonitorConfig::default();
    config.sip.transaction.instances = 0;

    let err = voipmon::start(
        &config,
        Arc::new(sinks.clock.clone()),
        sinks.persistence.clone(),
        sinks.metrics.clone(),
    )
    .err()
    .unwrap();
    assert!(err.is_fatal());
}

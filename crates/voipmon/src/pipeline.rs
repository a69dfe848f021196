//! Pipeline wiring
//!
//! ```text
//! capture bytes ─► CaptureIngress ─► sip queue ─► transaction worker ─┬─► shard workers
//!                        │                                             ├─► sdp / keep-alive ─┐
//!                        └────────► rtcp queue ─► rtcp worker ─► reports ───────────────────┴─► media worker
//! ```
//!
//! RTCP-derived reports reach the media worker only with `media.rtcp_reports`.
//! Every arrow is a bounded drop-oldest queue. Shutdown closes the inputs and
//! lets each worker drain and flush before its downstream workers finish.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use voipmon_capture_core::{CaptureDecoder, CaptureError, Packet, ProtocolCode, StaticHostResolver};
use voipmon_infra_common::config::MonitorConfig;
use voipmon_infra_common::events::{bounded, EventSender, QueueStats};
use voipmon_infra_common::sink::{MetricsSink, PersistenceSink};
use voipmon_infra_common::time::Clock;
use voipmon_infra_common::Result;
use voipmon_media_core::MediaAggregator;
use voipmon_rtp_core::{RtcpTracker, RtpReport};
use voipmon_transaction_core::{KeepAlive, TransactionEngine, TransactionOutputs};

use crate::workers::{
    run_drop_reporter, run_media_worker, run_rtcp_worker, run_shard_worker, run_transaction_worker,
    DropReporter, MediaInputs,
};

/// How often queue drops are turned into metrics
const DROP_REPORT_PERIOD: Duration = Duration::from_secs(10);

/// Entry point for raw capture datagrams and decoded packets
///
/// Cheap to clone; listeners each hold one.
#[derive(Clone)]
pub struct CaptureIngress {
    decoder: Arc<CaptureDecoder>,
    sip: EventSender<Packet>,
    rtcp: EventSender<Packet>,
}

impl CaptureIngress {
    /// Decode one capture datagram and queue the packet for its component
    pub fn ingest_capture(&self, datagram: &[u8]) -> std::result::Result<(), CaptureError> {
        let packet = self.decoder.decode(datagram)?;
        self.dispatch(packet);
        Ok(())
    }

    /// Queue an RTCP packet decoded elsewhere
    pub fn ingest_rtcp(&self, packet: Packet) {
        self.rtcp.send(packet);
    }

    fn dispatch(&self, packet: Packet) {
        match packet.protocol {
            ProtocolCode::Sip => self.sip.send(packet),
            ProtocolCode::Rtcp => self.rtcp.send(packet),
        };
    }

    pub fn decoder(&self) -> &CaptureDecoder {
        &self.decoder
    }
}

/// Running pipeline
pub struct PipelineHandle {
    ingress: CaptureIngress,
    reports: EventSender<RtpReport>,
    keep_alive: EventSender<KeepAlive>,
    upstream: Vec<JoinHandle<()>>,
    media: JoinHandle<()>,
    shards: Vec<JoinHandle<()>>,
    reporter: JoinHandle<()>,
    reporter_cancel: CancellationToken,
}

impl PipelineHandle {
    /// Ingress for listeners
    pub fn ingress(&self) -> CaptureIngress {
        self.ingress.clone()
    }

    pub fn ingest_capture(&self, datagram: &[u8]) -> std::result::Result<(), CaptureError> {
        self.ingress.ingest_capture(datagram)
    }

    pub fn ingest_rtcp(&self, packet: Packet) {
        self.ingress.ingest_rtcp(packet);
    }

    /// Hand an externally produced RTP report to the media aggregator
    pub fn submit_rtp_report(&self, report: RtpReport) {
        self.reports.send(report);
    }

    /// Refresh the media sessions of a call
    pub fn keep_alive(&self, call_id: impl Into<String>, timestamp: DateTime<Utc>) {
        self.keep_alive.send(KeepAlive {
            call_id: call_id.into(),
            timestamp,
        });
    }

    /// Close the inputs, then wait for every worker to drain and flush
    ///
    /// Ingress clones handed to listeners must be dropped first, otherwise the
    /// capture queues stay open.
    pub async fn shutdown(self) {
        let PipelineHandle {
            ingress,
            reports,
            keep_alive,
            upstream,
            media,
            shards,
            reporter,
            reporter_cancel,
        } = self;
        drop(ingress);
        drop(reports);
        drop(keep_alive);

        for task in upstream.into_iter().chain(std::iter::once(media)).chain(shards) {
            if let Err(e) = task.await {
                warn!("Pipeline worker failed: {}", e);
            }
        }

        reporter_cancel.cancel();
        if let Err(e) = reporter.await {
            warn!("Drop reporter failed: {}", e);
        }
        info!("Pipeline stopped");
    }
}

/// Build every component from the configuration and spawn its worker
///
/// Must be called from within a tokio runtime.
pub fn start(
    config: &MonitorConfig,
    clock: Arc<dyn Clock>,
    persistence: Arc<dyn PersistenceSink>,
    metrics: Arc<dyn MetricsSink>,
) -> Result<PipelineHandle> {
    config.validate()?;
    let capacity = config.queue_capacity;
    let suffix = config.time_suffix.clone();
    let transaction_config = config.sip.transaction.clone();

    let resolver = StaticHostResolver::from_table(&config.hosts)?;
    debug!("Static host table holds {} addresses", resolver.len());
    let decoder = CaptureDecoder::new(metrics.clone()).with_resolver(Arc::new(resolver));

    let (sip_tx, sip_rx) = bounded("sip_packets", capacity);
    let (rtcp_tx, rtcp_rx) = bounded("rtcp_packets", capacity);
    let (reports_tx, reports_rx) = bounded("rtp_reports", capacity);
    let (sdp_tx, sdp_rx) = bounded("sdp_events", capacity);
    let (keep_alive_tx, keep_alive_rx) = bounded("keep_alives", capacity);

    let mut probes: Vec<Box<dyn QueueStats>> = vec![
        Box::new(sip_tx.probe()),
        Box::new(rtcp_tx.probe()),
        Box::new(reports_tx.probe()),
        Box::new(sdp_tx.probe()),
        Box::new(keep_alive_tx.probe()),
    ];

    let mut shard_txs = Vec::with_capacity(transaction_config.instances);
    let mut shards = Vec::with_capacity(transaction_config.instances);
    for shard in 0..transaction_config.instances {
        let (tx, rx) = bounded(format!("sip_shard_{}", shard), capacity);
        probes.push(Box::new(tx.probe()));
        shard_txs.push(tx);
        shards.push(tokio::spawn(run_shard_worker(
            shard,
            rx,
            suffix.clone(),
            persistence.clone(),
        )));
    }

    let engine = TransactionEngine::new(
        transaction_config.clone(),
        suffix.clone(),
        TransactionOutputs {
            sdp: Some(sdp_tx),
            keep_alive: Some(keep_alive_tx.clone()),
            shards: shard_txs,
        },
        persistence.clone(),
        metrics.clone(),
    );
    let tracker = RtcpTracker::new(
        config.rtcp.clone(),
        suffix.clone(),
        persistence.clone(),
        metrics.clone(),
    );
    let aggregator =
        MediaAggregator::new(config.media.clone(), suffix, persistence, metrics.clone());

    let upstream = vec![
        tokio::spawn(run_transaction_worker(
            engine,
            sip_rx,
            transaction_config.expiration_delay(),
            transaction_config.trim_to_size_delay(),
            clock.clone(),
        )),
        tokio::spawn(run_rtcp_worker(
            tracker,
            rtcp_rx,
            config.media.rtcp_reports.then(|| reports_tx.clone()),
            config.rtcp.expiration_delay(),
            clock.clone(),
        )),
    ];
    let media = tokio::spawn(run_media_worker(
        aggregator,
        MediaInputs {
            sdp: sdp_rx,
            keep_alive: keep_alive_rx,
            reports: reports_rx,
        },
        config.media.expiration_delay(),
        clock,
    ));

    let reporter_cancel = CancellationToken::new();
    let reporter = tokio::spawn(run_drop_reporter(
        DropReporter::new(probes),
        metrics,
        DROP_REPORT_PERIOD,
        reporter_cancel.clone(),
    ));

    info!(
        shards = transaction_config.instances,
        queue_capacity = capacity,
        "Pipeline started"
    );

    Ok(PipelineHandle {
        ingress: CaptureIngress {
            decoder: Arc::new(decoder),
            sip: sip_tx,
            rtcp: rtcp_tx,
        },
        reports: reports_tx,
        keep_alive: keep_alive_tx,
        upstream,
        media,
        shards,
        reporter,
        reporter_cancel,
    })
}

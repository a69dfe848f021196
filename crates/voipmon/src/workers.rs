//! Per-component worker loops
//!
//! Each correlation component is owned by exactly one task. The task selects
//! over its input queues and its sweep interval, so the component map is never
//! shared. A worker stops once every sender of its inputs is gone, after draining
//! what is left and flushing the component.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use voipmon_capture_core::Packet;
use voipmon_infra_common::events::{EventReceiver, EventSender, QueueStats};
use voipmon_infra_common::sink::{
    attributes, collection_name, Document, MetricsSink, PersistenceSink,
};
use voipmon_infra_common::time::Clock;
use voipmon_media_core::MediaAggregator;
use voipmon_rtp_core::{RtcpTracker, RtpReport};
use voipmon_transaction_core::{KeepAlive, RoutedTransaction, SdpSessionEvent, TransactionEngine};

fn sweep_interval(period: Duration) -> Interval {
    // First sweep one period after start
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Drive the SIP transaction engine
pub async fn run_transaction_worker(
    mut engine: TransactionEngine,
    mut packets: EventReceiver<Packet>,
    expiration_delay: Duration,
    trim_to_size_delay: Duration,
    clock: Arc<dyn Clock>,
) {
    let mut expire = sweep_interval(expiration_delay);
    let mut compact = sweep_interval(trim_to_size_delay);

    loop {
        tokio::select! {
            packet = packets.recv() => match packet {
                Some(packet) => {
                    if let Err(e) = engine.handle(&packet) {
                        debug!(src = %packet.src, "SIP packet dropped: {}", e);
                    }
                }
                None => break,
            },
            _ = expire.tick() => {
                engine.expire(clock.now());
            }
            _ = compact.tick() => engine.compact(),
        }
    }

    let flushed = engine.shutdown_flush();
    info!("Transaction worker stopped, {} transactions flushed", flushed);
}

/// Drive the RTCP session tracker
///
/// Emitted reports are forwarded to the media worker only when `reports` is set;
/// the tracker persists them either way.
pub async fn run_rtcp_worker(
    mut tracker: RtcpTracker,
    mut packets: EventReceiver<Packet>,
    reports: Option<EventSender<RtpReport>>,
    expiration_delay: Duration,
    clock: Arc<dyn Clock>,
) {
    let mut expire = sweep_interval(expiration_delay);

    loop {
        tokio::select! {
            packet = packets.recv() => match packet {
                Some(packet) => match tracker.handle(&packet) {
                    Ok(emitted) => {
                        if let Some(reports) = &reports {
                            for report in emitted {
                                reports.send(report);
                            }
                        }
                    }
                    Err(e) => debug!(src = %packet.src, "RTCP packet dropped: {}", e),
                },
                None => break,
            },
            _ = expire.tick() => {
                tracker.expire(clock.now());
            }
        }
    }

    let dropped = tracker.shutdown_flush();
    info!("RTCP worker stopped, {} sessions dropped", dropped);
}

/// Inputs of the media worker
pub struct MediaInputs {
    pub sdp: EventReceiver<SdpSessionEvent>,
    pub keep_alive: EventReceiver<KeepAlive>,
    pub reports: EventReceiver<RtpReport>,
}

/// Drive the media session aggregator
pub async fn run_media_worker(
    mut aggregator: MediaAggregator,
    mut inputs: MediaInputs,
    expiration_delay: Duration,
    clock: Arc<dyn Clock>,
) {
    let mut expire = sweep_interval(expiration_delay);
    let (mut sdp_open, mut keep_alive_open, mut reports_open) = (true, true, true);

    while sdp_open || keep_alive_open || reports_open {
        tokio::select! {
            event = inputs.sdp.recv(), if sdp_open => match event {
                Some(event) => {
                    if let Err(e) = aggregator.on_sdp(&event) {
                        warn!(call_id = %event.call_id, "SDP session event discarded: {}", e);
                    }
                }
                None => sdp_open = false,
            },
            keep_alive = inputs.keep_alive.recv(), if keep_alive_open => match keep_alive {
                Some(keep_alive) => {
                    aggregator.keep_alive(&keep_alive.call_id, keep_alive.timestamp);
                }
                None => keep_alive_open = false,
            },
            report = inputs.reports.recv(), if reports_open => match report {
                Some(report) => {
                    if let Err(e) = aggregator.on_rtp_report(&report) {
                        trace!(
                            src = %report.src,
                            ssrc = report.ssrc,
                            "RTP report not aggregated: {}",
                            e
                        );
                    }
                }
                None => reports_open = false,
            },
            _ = expire.tick() => {
                aggregator.expire(clock.now());
            }
        }
    }

    let persisted = aggregator.shutdown_flush();
    info!("Media worker stopped, {} sessions persisted", persisted);
}

/// Collection prefix of a routed transaction
pub fn routed_collection_prefix(routed: &RoutedTransaction) -> String {
    format!("sip_{}", routed.group)
}

/// Persist transactions routed to one aggregation shard
pub async fn run_shard_worker(
    shard: usize,
    mut routed: EventReceiver<RoutedTransaction>,
    time_suffix: String,
    persistence: Arc<dyn PersistenceSink>,
) {
    let mut count: u64 = 0;
    while let Some(item) = routed.recv().await {
        let collection = collection_name(
            &routed_collection_prefix(&item),
            item.transaction.created_at,
            &time_suffix,
        );
        match Document::from_record(collection, &item.transaction) {
            Ok(document) => persistence.write(document),
            Err(e) => warn!(
                shard,
                "Failed to persist routed transaction {}: {}",
                item.transaction.key,
                e
            ),
        }
        count += 1;
    }
    debug!(shard, "Shard worker stopped after {} transactions", count);
}

/// Emit `queue_dropped` deltas for every pipeline queue
pub struct DropReporter {
    queues: Vec<Box<dyn QueueStats>>,
    reported: Vec<u64>,
}

impl DropReporter {
    pub fn new(queues: Vec<Box<dyn QueueStats>>) -> Self {
        let reported = vec![0; queues.len()];
        Self { queues, reported }
    }

    pub fn report(&mut self, metrics: &dyn MetricsSink) {
        for (queue, reported) in self.queues.iter().zip(self.reported.iter_mut()) {
            let dropped = queue.dropped();
            if dropped > *reported {
                metrics.counter(
                    "queue_dropped",
                    dropped - *reported,
                    &attributes([("queue", queue.name())]),
                );
                *reported = dropped;
            }
        }
    }
}

/// Report queue drops every `period` until cancelled
pub async fn run_drop_reporter(
    mut reporter: DropReporter,
    metrics: Arc<dyn MetricsSink>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => reporter.report(metrics.as_ref()),
            _ = cancel.cancelled() => break,
        }
    }
    reporter.report(metrics.as_ref());
}

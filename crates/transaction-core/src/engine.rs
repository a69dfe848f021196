//! SIP transaction engine
//!
//! Owns the transaction map. Every SIP packet is merged into the transaction its
//! key names; a periodic [`TransactionEngine::expire`] sweep removes transactions
//! past their deadline and routes them:
//!
//! - methods with a downstream aggregator ([`RouteGroup`]) go to the shard chosen
//!   by [`shard_for`]
//! - everything else is persisted here, feeding the `sip_response_delay` timer
//!
//! INVITE transactions whose final response answers an SDP offer also produce an
//! [`SdpSessionEvent`] for the media aggregator.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

use voipmon_capture_core::Packet;
use voipmon_infra_common::config::TransactionConfig;
use voipmon_infra_common::events::EventSender;
use voipmon_infra_common::sink::{
    attributes, collection_name, Document, MetricsSink, PersistenceSink,
};

use crate::error::{Result, TransactionError};
use crate::events::{KeepAlive, RoutedTransaction, SdpSessionEvent};
use crate::routing::{shard_for, RouteGroup};
use crate::transaction::{SipTransaction, TransactionKey};

/// Collection prefix for directly persisted transactions
pub const TRANSACTION_COLLECTION: &str = "sip_transaction";

/// Methods never tracked regardless of configuration
pub const ALWAYS_EXCLUDED: &[&str] = &["ACK", "CANCEL"];

/// Where the engine sends what it produces
#[derive(Debug, Clone, Default)]
pub struct TransactionOutputs {
    /// Media aggregator input
    pub sdp: Option<EventSender<SdpSessionEvent>>,
    /// Media aggregator keep-alive input
    pub keep_alive: Option<EventSender<KeepAlive>>,
    /// One queue per downstream aggregation shard
    pub shards: Vec<EventSender<RoutedTransaction>>,
}

pub struct TransactionEngine {
    config: TransactionConfig,
    time_suffix: String,
    exclusions: HashSet<String>,
    transactions: HashMap<TransactionKey, SipTransaction>,
    outputs: TransactionOutputs,
    persistence: Arc<dyn PersistenceSink>,
    metrics: Arc<dyn MetricsSink>,
}

impl TransactionEngine {
    pub fn new(
        config: TransactionConfig,
        time_suffix: impl Into<String>,
        outputs: TransactionOutputs,
        persistence: Arc<dyn PersistenceSink>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let exclusions = ALWAYS_EXCLUDED
            .iter()
            .map(|m| m.to_string())
            .chain(config.transaction_exclusions.iter().map(|m| m.to_ascii_uppercase()))
            .collect();

        Self {
            config,
            time_suffix: time_suffix.into(),
            exclusions,
            transactions: HashMap::new(),
            outputs,
            persistence,
            metrics,
        }
    }

    fn is_excluded(&self, method: &str) -> bool {
        self.exclusions.contains(method)
    }

    /// Merge one SIP packet
    pub fn handle(&mut self, packet: &Packet) -> Result<()> {
        let text =
            std::str::from_utf8(&packet.payload).map_err(|_| TransactionError::InvalidEncoding)?;
        match rsip::SipMessage::try_from(text)? {
            rsip::SipMessage::Request(req) => self.on_request(packet, &req),
            rsip::SipMessage::Response(resp) => self.on_response(packet, &resp),
        }
    }

    fn on_request(&mut self, packet: &Packet, req: &rsip::Request) -> Result<()> {
        let method = req.method.to_string();
        if self.is_excluded(&method) {
            return Err(TransactionError::Excluded(method));
        }

        let key = TransactionKey::try_from(req)?;
        let retain = self.config.save_sip_message_payload;
        let transaction = self.transactions.entry(key.clone()).or_insert_with(|| {
            trace!(key = %key, "New transaction from request");
            SipTransaction::new(key, packet.timestamp, packet.src.clone(), packet.dst.clone())
        });
        transaction.on_request(packet, req, retain);

        let call_id = transaction.call_id.clone();
        self.keep_alive(&method, call_id, packet.timestamp);
        Ok(())
    }

    fn on_response(&mut self, packet: &Packet, resp: &rsip::Response) -> Result<()> {
        let key = TransactionKey::try_from(resp)?;
        if self.is_excluded(&key.method) {
            return Err(TransactionError::Excluded(key.method));
        }

        let retain = self.config.save_sip_message_payload;
        let transaction = self.transactions.entry(key.clone()).or_insert_with(|| {
            trace!(key = %key, "New transaction from response");
            SipTransaction::new(key, packet.timestamp, packet.dst.clone(), packet.src.clone())
        });

        let answer = transaction.on_response(packet, resp, retain);
        let sdp_event = match (answer, &transaction.offer) {
            (Some(answer), Some(offer)) => Some(SdpSessionEvent {
                call_id: transaction.call_id.clone(),
                timestamp: packet.timestamp,
                records: vec![offer.clone(), answer],
            }),
            _ => None,
        };
        let method = transaction.method.clone();
        let call_id = transaction.call_id.clone();

        if let Some(event) = sdp_event {
            debug!(call_id = %event.call_id, "SDP offer/answer completed");
            if let Some(sdp) = &self.outputs.sdp {
                sdp.send(event);
            }
        }
        self.keep_alive(&method, call_id, packet.timestamp);
        Ok(())
    }

    fn keep_alive(&self, method: &str, call_id: String, timestamp: DateTime<Utc>) {
        if RouteGroup::of(method) != Some(RouteGroup::Call) {
            return;
        }
        if let Some(keep_alive) = &self.outputs.keep_alive {
            keep_alive.send(KeepAlive { call_id, timestamp });
        }
    }

    /// Remove and route every transaction past its deadline
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let expired: Vec<TransactionKey> = self
            .transactions
            .iter()
            .filter(|(_, transaction)| transaction.deadline(&self.config) <= now)
            .map(|(key, _)| key.clone())
            .collect();

        let mut routed = 0;
        for key in expired {
            if let Some(transaction) = self.transactions.remove(&key) {
                self.route(transaction);
                routed += 1;
            }
        }
        if routed > 0 {
            debug!("Routed {} expired transactions", routed);
        }
        routed
    }

    /// Release capacity left behind by removed transactions
    pub fn compact(&mut self) {
        let before = self.transactions.capacity();
        self.transactions.shrink_to_fit();
        trace!(before, after = self.transactions.capacity(), "Compacted transaction map");
    }

    /// Route every open transaction, whatever its deadline
    pub fn shutdown_flush(&mut self) -> usize {
        let transactions: Vec<SipTransaction> = self.transactions.drain().map(|(_, t)| t).collect();
        let count = transactions.len();
        for transaction in transactions {
            self.route(transaction);
        }
        count
    }

    fn route(&self, mut transaction: SipTransaction) {
        let outcome = transaction.finalize();
        let group = RouteGroup::of(&transaction.method);

        self.metrics.counter(
            "sip_transactions_routed",
            1,
            &attributes([
                ("method", transaction.method.as_str()),
                ("route", group.map(|g| g.as_str()).unwrap_or("direct")),
                ("outcome", outcome.as_str()),
            ]),
        );

        match group {
            Some(group) if !self.outputs.shards.is_empty() => {
                let shard = shard_for(&transaction.call_id, self.outputs.shards.len());
                self.outputs.shards[shard].send(RoutedTransaction {
                    shard,
                    group,
                    transaction,
                });
            }
            _ => self.persist(&transaction),
        }
    }

    fn persist(&self, transaction: &SipTransaction) {
        if let Some(delay) = transaction.response_delay().and_then(|d| d.to_std().ok()) {
            let src_host = transaction.src.host_or_ip();
            let dst_host = transaction.dst.host_or_ip();
            self.metrics.timer(
                "sip_response_delay",
                delay,
                &attributes([
                    ("method", transaction.method.as_str()),
                    ("src_host", src_host.as_str()),
                    ("dst_host", dst_host.as_str()),
                ]),
            );
        }

        let collection =
            collection_name(TRANSACTION_COLLECTION, transaction.created_at, &self.time_suffix);
        match Document::from_record(collection, transaction) {
            Ok(document) => self.persistence.write(document),
            Err(e) => warn!("Failed to persist transaction {}: {}", transaction.key, e),
        }
    }

    pub fn get(&self, key: &TransactionKey) -> Option<&SipTransaction> {
        self.transactions.get(key)
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl std::fmt::Debug for TransactionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionEngine")
            .field("transactions", &self.transactions.len())
            .field("shards", &self.outputs.shards.len())
            .finish()
    }
}

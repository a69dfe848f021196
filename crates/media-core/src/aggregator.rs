//! Media session aggregator
//!
//! Sessions are grouped per call id and keyed by their composite endpoint key.
//! Three inputs feed the map:
//!
//! - SDP session events create the offer/answer session and register its
//!   endpoints so that later reports without a call id can be matched
//! - RTP reports are folded into the session of their endpoint pair, creating it
//!   when the pair is new
//! - keep-alives from signaling refresh the alive time of a call's sessions
//!
//! The periodic [`MediaAggregator::expire`] sweep is the only removal path.
//! Idle sessions that saw at least one report are finalized and persisted
//! exactly once; the others are dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, trace, warn};

use voipmon_infra_common::config::MediaConfig;
use voipmon_infra_common::sink::{
    attributes, collection_name, Document, MetricsSink, PersistenceSink,
};
use voipmon_rtp_core::{ReportSource, RtpReport};
use voipmon_transaction_core::SdpSessionEvent;

use crate::error::{MediaError, Result};
use crate::session::{MediaKey, MediaSession};

/// Collection prefix for finalized media sessions
pub const SESSION_COLLECTION: &str = "media_session";

/// Owns the media session map
pub struct MediaAggregator {
    config: MediaConfig,
    time_suffix: String,
    sessions: HashMap<String, HashMap<MediaKey, MediaSession>>,
    /// Endpoint pairs announced by SDP, for reports without a call id
    endpoints: HashMap<MediaKey, String>,
    persistence: Arc<dyn PersistenceSink>,
    metrics: Arc<dyn MetricsSink>,
}

impl MediaAggregator {
    pub fn new(
        config: MediaConfig,
        time_suffix: impl Into<String>,
        persistence: Arc<dyn PersistenceSink>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            config,
            time_suffix: time_suffix.into(),
            sessions: HashMap::new(),
            endpoints: HashMap::new(),
            persistence,
            metrics,
        }
    }

    /// Register an offer/answer exchange
    ///
    /// Returns `true` when a new session was created. An event that does not
    /// carry exactly two records leaves the map untouched.
    pub fn on_sdp(&mut self, event: &SdpSessionEvent) -> Result<bool> {
        let (offer, answer) = match event.records.as_slice() {
            [offer, answer] => (offer, answer),
            records => {
                error!(
                    call_id = %event.call_id,
                    "Discarding SDP session event with {} records",
                    records.len()
                );
                return Err(MediaError::InvalidSdpRecordCount(records.len()));
            }
        };

        let key = MediaKey::new(offer.address, answer.address);
        self.endpoints.insert(key, event.call_id.clone());

        let calls = self.sessions.entry(event.call_id.clone()).or_default();
        if calls.contains_key(&key) {
            return Ok(false);
        }

        let mut session = MediaSession::new(
            event.call_id.clone(),
            offer.address,
            answer.address,
            event.timestamp,
        );
        session.codec = answer
            .primary_codec()
            .or_else(|| offer.primary_codec())
            .map(|codec| codec.name.clone());
        debug!(call_id = %event.call_id, key = %key, "Media session created from SDP");
        calls.insert(key, session);
        Ok(true)
    }

    /// Fold one RTP report
    pub fn on_rtp_report(&mut self, report: &RtpReport) -> Result<()> {
        if report.source == ReportSource::Rtcp && !self.config.rtcp_reports {
            return Err(MediaError::UnsupportedSource);
        }

        // Keyed from the receiver's side
        let key = MediaKey::new(report.dst.addr, report.src.addr);
        let call_id = report
            .call_id
            .clone()
            .or_else(|| self.endpoints.get(&key).cloned())
            .ok_or(MediaError::MissingCallId)?;

        let session = self
            .sessions
            .entry(call_id.clone())
            .or_default()
            .entry(key)
            .or_insert_with(|| {
                trace!(call_id = %call_id, key = %key, "Media session created from report");
                MediaSession::new(
                    call_id.clone(),
                    report.dst.addr,
                    report.src.addr,
                    report.created_at,
                )
            });

        if session.fold_report(report, self.config.r_factor_threshold) {
            trace!(
                call_id = %session.call_id,
                r_factor = report.r_factor,
                "Bad quality report"
            );
        }
        Ok(())
    }

    /// Refresh every session of a call
    ///
    /// Returns the number of sessions refreshed.
    pub fn keep_alive(&mut self, call_id: &str, at: DateTime<Utc>) -> usize {
        match self.sessions.get_mut(call_id) {
            Some(calls) => {
                calls.values_mut().for_each(|session| session.touch(at));
                calls.len()
            }
            None => 0,
        }
    }

    /// Remove idle sessions, persisting those that saw reports
    ///
    /// Returns the number of sessions persisted.
    pub fn expire(&mut self, now: DateTime<Utc>) -> usize {
        let timeout = self.config.aggregation_timeout();
        let expired: Vec<(String, MediaKey)> = self
            .sessions
            .iter()
            .flat_map(|(call_id, calls)| {
                calls
                    .iter()
                    .filter(move |(_, session)| session.is_idle(now, timeout))
                    .map(move |(key, _)| (call_id.clone(), *key))
            })
            .collect();

        let mut persisted = 0;
        for (call_id, key) in expired {
            let removed = self.sessions.get_mut(&call_id).and_then(|calls| calls.remove(&key));
            if self.endpoints.get(&key) == Some(&call_id) {
                self.endpoints.remove(&key);
            }
            if let Some(session) = removed {
                if self.complete(session) {
                    persisted += 1;
                }
            }
        }
        self.sessions.retain(|_, calls| !calls.is_empty());
        persisted
    }

    /// Finalize every open session, whatever its idle time
    pub fn shutdown_flush(&mut self) -> usize {
        self.endpoints.clear();
        let sessions: Vec<MediaSession> = self
            .sessions
            .drain()
            .flat_map(|(_, calls)| calls.into_values())
            .collect();

        let mut persisted = 0;
        for session in sessions {
            if self.complete(session) {
                persisted += 1;
            }
        }
        persisted
    }

    fn complete(&self, mut session: MediaSession) -> bool {
        if session.report_count == 0 {
            debug!(
                call_id = %session.call_id,
                key = %session.key,
                "Dropping media session without reports"
            );
            return false;
        }

        session.finalize();

        let one_way = if session.one_way { "true" } else { "false" };
        let attrs = attributes([("one_way", one_way)]);
        self.metrics.counter("media_sessions_finalized", 1, &attrs);
        self.metrics
            .summary("media_report_count", f64::from(session.report_count), &attrs);
        self.metrics
            .summary("media_bad_report_count", f64::from(session.bad_report_count), &attrs);
        self.metrics.timer(
            "media_duration",
            std::time::Duration::from_millis(session.duration_ms),
            &attrs,
        );

        let collection = collection_name(SESSION_COLLECTION, session.created_at, &self.time_suffix);
        match Document::from_record(collection, &session) {
            Ok(document) => self.persistence.write(document),
            Err(e) => warn!(call_id = %session.call_id, "Failed to persist media session: {}", e),
        }
        true
    }

    pub fn session(&self, call_id: &str, key: &MediaKey) -> Option<&MediaSession> {
        self.sessions.get(call_id)?.get(key)
    }

    /// Number of calls with at least one open session
    pub fn call_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of open sessions
    pub fn len(&self) -> usize {
        self.sessions.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl std::fmt::Debug for MediaAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaAggregator")
            .field("calls", &self.sessions.len())
            .field("endpoints", &self.endpoints.len())
            .finish()
    }
}

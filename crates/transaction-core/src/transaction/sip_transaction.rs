use chrono::{DateTime, Duration, Utc};
use rsip::prelude::{HeadersExt, ToTypedHeader};
use serde::Serialize;

use voipmon_capture_core::{Address, Packet};
use voipmon_infra_common::config::TransactionConfig;

use super::key::TransactionKey;
use super::state::{TransactionOutcome, TransactionState};
use crate::sdp::SessionDescription;

/// Attributes accumulated while the transaction is open
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransactionAttributes {
    /// Repeated requests and repeated final responses
    pub retransmits: u32,
    /// Final status code of a failed transaction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<u16>,
    /// Resolved host names of both peers
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
}

/// One SIP request and its responses
#[derive(Debug, Clone, Serialize)]
pub struct SipTransaction {
    #[serde(skip)]
    pub key: TransactionKey,
    pub call_id: String,
    pub method: String,
    pub cseq: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,

    pub state: TransactionState,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub established_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminated_at: Option<DateTime<Utc>>,

    /// Request originator
    pub src: Address,
    /// Request target
    pub dst: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caller: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callee: Option<String>,

    /// Latest response code; the final one once terminated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<TransactionOutcome>,
    pub attributes: TransactionAttributes,

    /// Raw request text, INVITE with payload retention only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    /// Raw final response text, INVITE with payload retention only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// SDP offer carried by an INVITE request
    #[serde(skip)]
    pub offer: Option<SessionDescription>,

    #[serde(skip)]
    request_seen: bool,
}

fn uri_user(uri: &rsip::Uri) -> Option<String> {
    uri.auth.as_ref().map(|auth| auth.user.clone())
}

fn caller_of(headers: &impl HeadersExt) -> Option<String> {
    let from = headers.from_header().ok()?.typed().ok()?;
    uri_user(&from.uri)
}

fn callee_of(headers: &impl HeadersExt) -> Option<String> {
    let to = headers.to_header().ok()?.typed().ok()?;
    uri_user(&to.uri)
}

impl SipTransaction {
    /// Open a transaction from its first observed message
    ///
    /// `src` is the request originator, even when the first message is a response.
    pub fn new(key: TransactionKey, created_at: DateTime<Utc>, src: Address, dst: Address) -> Self {
        Self {
            call_id: key.call_id.clone(),
            method: key.method.clone(),
            cseq: key.cseq,
            branch: key.branch.clone(),
            key,
            state: TransactionState::Created,
            created_at,
            established_at: None,
            terminated_at: None,
            src,
            dst,
            caller: None,
            callee: None,
            status_code: None,
            outcome: None,
            attributes: TransactionAttributes::default(),
            request: None,
            response: None,
            offer: None,
            request_seen: false,
        }
    }

    pub fn is_invite(&self) -> bool {
        self.method == "INVITE"
    }

    /// Merge a request
    pub fn on_request(&mut self, packet: &Packet, req: &rsip::Request, retain_payload: bool) {
        if self.request_seen {
            self.attributes.retransmits += 1;
            return;
        }
        self.request_seen = true;

        self.src = packet.src.clone();
        self.dst = packet.dst.clone();
        if packet.timestamp < self.created_at {
            self.created_at = packet.timestamp;
        }
        self.caller = caller_of(req);
        self.callee = callee_of(req);

        if self.is_invite() {
            if !req.body.is_empty() {
                self.offer = SessionDescription::parse(&req.body);
            }
            if retain_payload {
                self.request = Some(String::from_utf8_lossy(&packet.payload).into_owned());
            }
        }
    }

    /// Merge a response
    ///
    /// Returns the SDP answer when a final INVITE response completes an offer/answer
    /// exchange.
    pub fn on_response(
        &mut self,
        packet: &Packet,
        resp: &rsip::Response,
        retain_payload: bool,
    ) -> Option<SessionDescription> {
        let code = resp.status_code.code();
        let at = packet.timestamp;

        if !self.request_seen && self.caller.is_none() {
            self.caller = caller_of(resp);
            self.callee = callee_of(resp);
        }

        if code < 200 {
            if self.state == TransactionState::Created {
                self.state = TransactionState::Established;
                self.established_at = Some(at);
            }
            if self.state != TransactionState::Terminated {
                self.status_code = Some(code);
            }
            return None;
        }

        if self.state == TransactionState::Terminated {
            self.attributes.retransmits += 1;
            return None;
        }

        self.state = TransactionState::Terminated;
        self.established_at.get_or_insert(at);
        self.terminated_at = Some(at);
        self.status_code = Some(code);

        if !self.is_invite() {
            return None;
        }
        if retain_payload {
            self.response = Some(String::from_utf8_lossy(&packet.payload).into_owned());
        }
        if self.offer.is_some() && !resp.body.is_empty() {
            SessionDescription::parse(&resp.body)
        } else {
            None
        }
    }

    /// When the sweep may remove this transaction
    pub fn deadline(&self, config: &TransactionConfig) -> DateTime<Utc> {
        match self.terminated_at {
            Some(terminated_at) => terminated_at + config.termination_timeout(),
            None if self.established_at.is_some() => self.created_at + config.aggregation_timeout(),
            None => self.created_at + config.response_timeout(),
        }
    }

    /// Time from the request to the final response
    pub fn response_delay(&self) -> Option<Duration> {
        if !self.request_seen {
            return None;
        }
        self.terminated_at.map(|at| at - self.created_at)
    }

    /// Settle the outcome and the derived attributes before routing
    pub fn finalize(&mut self) -> TransactionOutcome {
        let outcome = TransactionOutcome::classify(self.state, self.status_code);
        if outcome == TransactionOutcome::Failed {
            self.attributes.error_code = self.status_code;
        }

        let mut hosts: Vec<String> = [&self.src.host, &self.dst.host]
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        hosts.dedup();
        self.attributes.hosts = hosts;

        self.outcome = Some(outcome);
        outcome
    }
}

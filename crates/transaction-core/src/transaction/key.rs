use std::fmt;

use rsip::prelude::{HeadersExt, ToTypedHeader, UntypedHeader};

use crate::error::{Result, TransactionError};

/// Correlation key of a SIP transaction
///
/// Built from the Call-ID, the CSeq number and method, and the branch of the
/// topmost Via. Requests and their responses produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey {
    pub call_id: String,
    pub method: String,
    pub cseq: u32,
    pub branch: Option<String>,
}

impl TransactionKey {
    pub fn new(
        call_id: impl Into<String>,
        method: impl Into<String>,
        cseq: u32,
        branch: Option<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            method: method.into(),
            cseq,
            branch,
        }
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.branch {
            Some(branch) => {
                write!(f, "{} {}/{} ({})", self.call_id, self.method, self.cseq, branch)
            }
            None => write!(f, "{} {}/{}", self.call_id, self.method, self.cseq),
        }
    }
}

fn branch_of(via: Option<&rsip::headers::Via>) -> Option<String> {
    via.and_then(|via| via.typed().ok())
        .and_then(|via| via.branch().map(|b| b.to_string()))
}

impl TryFrom<&rsip::Request> for TransactionKey {
    type Error = TransactionError;

    fn try_from(req: &rsip::Request) -> Result<Self> {
        let call_id = req
            .call_id_header()
            .map_err(|_| TransactionError::MissingHeader("Call-ID"))?
            .value()
            .to_string();
        let cseq = req
            .cseq_header()
            .map_err(|_| TransactionError::MissingHeader("CSeq"))?
            .seq()
            .map_err(|_| TransactionError::MissingHeader("CSeq"))?;

        Ok(Self {
            call_id,
            method: req.method.to_string(),
            cseq,
            branch: branch_of(req.via_header().ok()),
        })
    }
}

impl TryFrom<&rsip::Response> for TransactionKey {
    type Error = TransactionError;

    fn try_from(resp: &rsip::Response) -> Result<Self> {
        let call_id = resp
            .call_id_header()
            .map_err(|_| TransactionError::MissingHeader("Call-ID"))?
            .value()
            .to_string();
        let cseq = resp
            .cseq_header()
            .map_err(|_| TransactionError::MissingHeader("CSeq"))?;
        let method = cseq
            .method()
            .map_err(|_| TransactionError::MissingHeader("CSeq"))?;
        let seq = cseq.seq().map_err(|_| TransactionError::MissingHeader("CSeq"))?;

        Ok(Self {
            call_id,
            method: method.to_string(),
            cseq: seq,
            branch: branch_of(resp.via_header().ok()),
        })
    }
}

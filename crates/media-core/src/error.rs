use thiserror::Error;

/// Result alias for media aggregation
pub type Result<T> = std::result::Result<T, MediaError>;

/// Reasons an input is rejected by the media aggregator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// An SDP session event must carry exactly an offer and an answer
    #[error("SDP session event carries {0} records, expected 2")]
    InvalidSdpRecordCount(usize),

    /// Report source not folded into media sessions
    #[error("report source is not aggregated")]
    UnsupportedSource,

    /// Report has no call id and its endpoints are not known from SDP
    #[error("report has no call id and no SDP-registered endpoints")]
    MissingCallId,
}

impl MediaError {
    /// Violates an invariant of the aggregator input
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, MediaError::InvalidSdpRecordCount(_))
    }

    pub fn is_unsupported(&self) -> bool {
        !self.is_invariant_violation()
    }
}

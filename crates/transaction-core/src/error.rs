use thiserror::Error;

/// Result alias for transaction processing
pub type Result<T> = std::result::Result<T, TransactionError>;

/// Reasons a SIP packet is not merged into a transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// Payload is not a parseable SIP message
    #[error("SIP parse error: {0}")]
    Sip(String),

    /// Payload is not valid UTF-8
    #[error("SIP payload is not valid UTF-8")]
    InvalidEncoding,

    /// A header needed for the transaction key is absent or broken
    #[error("missing or invalid {0} header")]
    MissingHeader(&'static str),

    /// Method is never tracked
    #[error("method {0} is excluded from transaction tracking")]
    Excluded(String),
}

impl From<rsip::Error> for TransactionError {
    fn from(e: rsip::Error) -> Self {
        TransactionError::Sip(e.to_string())
    }
}

impl TransactionError {
    pub fn is_malformed(&self) -> bool {
        !self.is_unsupported()
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, TransactionError::Excluded(_))
    }
}

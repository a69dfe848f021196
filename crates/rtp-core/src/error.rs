use thiserror::Error;

/// Result alias for RTCP decoding
pub type Result<T> = std::result::Result<T, RtcpError>;

/// RTCP decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RtcpError {
    /// Buffer shorter than a fixed-size structure
    #[error("buffer too small: required {required} bytes, available {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// RTP version other than 2
    #[error("invalid RTCP version {0}")]
    InvalidVersion(u8),

    /// Declared packet length runs past the buffer
    #[error("RTCP packet type {packet_type} declares {length} bytes, only {available} available")]
    Truncated {
        packet_type: u8,
        length: usize,
        available: usize,
    },
}

impl RtcpError {
    pub fn is_malformed(&self) -> bool {
        true
    }

    pub fn is_unsupported(&self) -> bool {
        false
    }
}

use thiserror::Error;

/// Result alias for capture decoding
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Reasons a capture envelope is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Buffer shorter than a fixed-size structure
    #[error("buffer too small: required {required} bytes, available {available}")]
    BufferTooSmall { required: usize, available: usize },

    /// Chunk length points past the end of the buffer
    #[error("chunk type {chunk_type} declares {length} bytes, only {available} available")]
    ChunkOverrun {
        chunk_type: u16,
        length: usize,
        available: usize,
    },

    /// Chunk length shorter than its header or wrong for its type
    #[error("chunk type {chunk_type} has invalid length {length}")]
    InvalidChunkLength { chunk_type: u16, length: usize },

    /// A required chunk never appeared
    #[error("missing required chunk type {0}")]
    MissingChunk(u16),

    /// Address chunk is neither 4 nor 16 bytes
    #[error("address chunk type {chunk_type} has {length} bytes")]
    InvalidAddress { chunk_type: u16, length: usize },

    /// Capture time cannot be represented
    #[error("invalid capture time {seconds}s {micros}us")]
    InvalidTimestamp { seconds: u32, micros: u32 },

    /// Protocol type other than SIP
    #[error("unsupported protocol type {0}")]
    UnsupportedProtocol(u8),
}

impl CaptureError {
    /// Structurally broken input
    pub fn is_malformed(&self) -> bool {
        !self.is_unsupported()
    }

    /// Well-formed input carrying something the decoder does not handle
    pub fn is_unsupported(&self) -> bool {
        matches!(self, CaptureError::UnsupportedProtocol(_))
    }

    /// Short label used as a metric attribute
    pub fn reason(&self) -> &'static str {
        if self.is_unsupported() {
            "unsupported"
        } else {
            "malformed"
        }
    }
}

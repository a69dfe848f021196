use thiserror::Error;

/// Result alias for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the infrastructure layer
///
/// Only [`Error::Config`] is fatal: it is returned while loading or validating the
/// configuration at startup. The remaining variants are reported and logged by the
/// caller without stopping packet processing.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O failure in an adapter (listener, writer)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal state
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    /// Whether this error must abort startup
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

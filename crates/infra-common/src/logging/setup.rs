use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::types::{Error, Result};

/// `[logging]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level: `trace`, `debug`, `info`, `warn` or `error`
    pub level: String,
    /// One JSON object per line on stdout
    pub json: bool,
    pub file_info: bool,
    /// Extra per-target filters, e.g. `voipmon_transaction_core=debug`
    pub directives: Vec<String>,
    pub app_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
            directives: Vec::new(),
            app_name: "voipmon".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Build the filter: `RUST_LOG`, then the level, then the configured directives
    pub fn env_filter(&self) -> Result<EnvFilter> {
        let level = parse_log_level(&self.level)?;
        self.directives
            .iter()
            .try_fold(EnvFilter::from_default_env().add_directive(level.into()), |filter, raw| {
                let directive = Directive::from_str(raw)
                    .map_err(|e| Error::Config(format!("invalid log directive '{}': {}", raw, e)))?;
                Ok(filter.add_directive(directive))
            })
    }
}

/// Install the global subscriber; fails if one is already set
pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.env_filter()?)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().with_writer(std::io::stdout).try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Internal(format!("failed to install log subscriber: {}", e)))
}

pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| Error::Config(format!("invalid log level '{}'", level)))
}

pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("chatty").unwrap_err().is_fatal());
    }

    #[test]
    fn test_directives_are_checked() {
        let mut config = LoggingConfig::default();
        config.directives = vec!["voipmon_rtp_core=trace".to_string()];
        assert!(config.env_filter().is_ok());

        config.directives.push("voipmon=loud".to_string());
        assert!(config.env_filter().unwrap_err().is_fatal());
    }
}

//! Monitor configuration
//!
//! Loaded once at startup from a TOML file plus `VOIPMON__*` environment overrides
//! (e.g. `VOIPMON__SIP__TRANSACTION__INSTANCES=8`). Every field has a default, so an
//! empty file yields a working configuration apart from the listener address.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{Error, ErrorContext, ErrorExt, Result};
use crate::logging::LoggingConfig;
use crate::sink::render_time_suffix;
use crate::time::millis;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "VOIPMON";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// chrono format pattern for collection suffixes
    pub time_suffix: String,
    /// Capacity of every bounded hand-off queue
    pub queue_capacity: usize,
    pub logging: LoggingConfig,
    pub listener: ListenerConfig,
    pub sip: SipConfig,
    pub rtcp: RtcpConfig,
    pub media: MediaConfig,
    /// Logical host name to the addresses it owns
    pub hosts: BTreeMap<String, Vec<String>>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            time_suffix: "%Y%m%d".to_string(),
            queue_capacity: 65536,
            logging: LoggingConfig::default(),
            listener: ListenerConfig::default(),
            sip: SipConfig::default(),
            rtcp: RtcpConfig::default(),
            media: MediaConfig::default(),
            hosts: BTreeMap::new(),
        }
    }
}

impl MonitorConfig {
    /// Load from an optional TOML file and the environment, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let ctx = match path {
            Some(path) => ErrorContext::new("loading").subject(path.display()),
            None => ErrorContext::new("loading environment"),
        };
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let loaded: MonitorConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .in_context(ctx.clone())?;
        loaded.validate().in_context(ctx)?;
        Ok(loaded)
    }

    /// Parse a TOML document, then validate
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let loaded: MonitorConfig = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings the monitor cannot run with
    pub fn validate(&self) -> Result<()> {
        self.logging.env_filter()?;

        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be greater than zero".into()));
        }

        let probe = DateTime::<Utc>::UNIX_EPOCH;
        match render_time_suffix(&self.time_suffix, probe) {
            Some(suffix) if !suffix.is_empty() => {}
            _ => {
                return Err(Error::Config(format!(
                    "time_suffix '{}' does not render a collection suffix",
                    self.time_suffix
                )))
            }
        }

        let t = &self.sip.transaction;
        non_zero("sip.transaction.expiration_delay_ms", t.expiration_delay_ms)?;
        non_zero("sip.transaction.response_timeout_ms", t.response_timeout_ms)?;
        non_zero("sip.transaction.aggregation_timeout_ms", t.aggregation_timeout_ms)?;
        non_zero("sip.transaction.termination_timeout_ms", t.termination_timeout_ms)?;
        non_zero("sip.transaction.trim_to_size_delay_ms", t.trim_to_size_delay_ms)?;
        if t.instances == 0 {
            return Err(Error::Config("sip.transaction.instances must be greater than zero".into()));
        }

        non_zero("rtcp.expiration_delay_ms", self.rtcp.expiration_delay_ms)?;
        non_zero("rtcp.aggregation_timeout_ms", self.rtcp.aggregation_timeout_ms)?;
        non_zero("media.expiration_delay_ms", self.media.expiration_delay_ms)?;
        non_zero("media.aggregation_timeout_ms", self.media.aggregation_timeout_ms)?;

        if !self.media.r_factor_threshold.is_finite() || self.media.r_factor_threshold < 0.0 {
            return Err(Error::Config(
                "media.r_factor_threshold must be a non-negative number".into(),
            ));
        }

        for (host, addrs) in &self.hosts {
            for addr in addrs {
                addr.parse::<std::net::IpAddr>().map_err(|_| {
                    Error::Config(format!("hosts.{}: '{}' is not an IP address", host, addr))
                })?;
            }
        }

        Ok(())
    }
}

fn non_zero(name: &str, value: u64) -> Result<()> {
    if value == 0 {
        Err(Error::Config(format!("{} must be greater than zero", name)))
    } else {
        Ok(())
    }
}

/// Capture listener settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// UDP address receiving capture datagrams
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SipConfig {
    pub transaction: TransactionConfig,
}

/// SIP transaction engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    /// Sweep interval
    pub expiration_delay_ms: u64,
    /// Lifetime of a transaction that never saw a response
    pub response_timeout_ms: u64,
    /// Lifetime of a transaction with provisional responses only
    pub aggregation_timeout_ms: u64,
    /// Grace period after the final response
    pub termination_timeout_ms: u64,
    /// Map compaction interval
    pub trim_to_size_delay_ms: u64,
    /// Retain raw INVITE request/response text
    pub save_sip_message_payload: bool,
    /// Methods never tracked, on top of ACK and CANCEL
    pub transaction_exclusions: Vec<String>,
    /// Downstream call-aggregation shard count
    pub instances: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            expiration_delay_ms: 1000,
            response_timeout_ms: 3000,
            aggregation_timeout_ms: 60000,
            termination_timeout_ms: 4500,
            trim_to_size_delay_ms: 3_600_000,
            save_sip_message_payload: false,
            transaction_exclusions: Vec::new(),
            instances: 4,
        }
    }
}

impl TransactionConfig {
    pub fn expiration_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.expiration_delay_ms)
    }

    pub fn trim_to_size_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.trim_to_size_delay_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        millis(self.response_timeout_ms)
    }

    pub fn aggregation_timeout(&self) -> Duration {
        millis(self.aggregation_timeout_ms)
    }

    pub fn termination_timeout(&self) -> Duration {
        millis(self.termination_timeout_ms)
    }
}

/// RTCP session tracker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtcpConfig {
    pub expiration_delay_ms: u64,
    pub aggregation_timeout_ms: u64,
}

impl Default for RtcpConfig {
    fn default() -> Self {
        Self {
            expiration_delay_ms: 4000,
            aggregation_timeout_ms: 30000,
        }
    }
}

impl RtcpConfig {
    pub fn expiration_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.expiration_delay_ms)
    }

    pub fn aggregation_timeout(&self) -> Duration {
        millis(self.aggregation_timeout_ms)
    }
}

/// Media session aggregator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub expiration_delay_ms: u64,
    pub aggregation_timeout_ms: u64,
    /// Reports with a positive R-factor below this are counted as bad
    pub r_factor_threshold: f64,
    /// Fold RTCP-sourced reports into the RTCP sub-records
    pub rtcp_reports: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            expiration_delay_ms: 4000,
            aggregation_timeout_ms: 30000,
            r_factor_threshold: 85.0,
            rtcp_reports: false,
        }
    }
}

impl MediaConfig {
    pub fn expiration_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.expiration_delay_ms)
    }

    pub fn aggregation_timeout(&self) -> Duration {
        millis(self.aggregation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sip.transaction.instances, 4);
        assert_eq!(config.sip.transaction.response_timeout(), Duration::milliseconds(3000));
        assert!(!config.media.rtcp_reports);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = MonitorConfig::from_toml_str(
            r#"
            time_suffix = "%Y%m"

            [sip.transaction]
            instances = 8
            transaction_exclusions = ["OPTIONS"]

            [hosts]
            "pbx-1" = ["10.0.0.1", "10.0.0.2"]
            "#,
        )
        .unwrap();

        assert_eq!(config.time_suffix, "%Y%m");
        assert_eq!(config.sip.transaction.instances, 8);
        assert_eq!(config.sip.transaction.transaction_exclusions, vec!["OPTIONS"]);
        assert_eq!(config.sip.transaction.termination_timeout_ms, 4500);
        assert_eq!(config.hosts["pbx-1"].len(), 2);
    }

    #[test]
    fn test_rejects_zero_instances() {
        let err = MonitorConfig::from_toml_str("[sip.transaction]\ninstances = 0\n").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_rejects_empty_time_suffix() {
        let mut config = MonitorConfig::default();
        config.time_suffix = String::new();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_rejects_bad_host_address() {
        let mut config = MonitorConfig::default();
        config.hosts.insert("pbx".into(), vec!["not-an-ip".into()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_log_level() {
        let err = MonitorConfig::from_toml_str("[logging]\nlevel = \"chatty\"\n").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = MonitorConfig::load(Some(Path::new("/nonexistent/voipmon.toml"))).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("loading /nonexistent/voipmon.toml"));
    }
}

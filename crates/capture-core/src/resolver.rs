use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;

use voipmon_infra_common::{Error, Result};

/// Maps IP addresses to logical host names
pub trait HostResolver: Send + Sync {
    fn resolve(&self, ip: IpAddr) -> Option<String>;
}

/// Resolver backed by a fixed table, typically the `[hosts]` configuration section
#[derive(Debug, Clone, Default)]
pub struct StaticHostResolver {
    hosts: HashMap<IpAddr, String>,
}

impl StaticHostResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `host name -> addresses`
    pub fn from_table(table: &BTreeMap<String, Vec<String>>) -> Result<Self> {
        let mut resolver = Self::new();
        for (host, addrs) in table {
            for addr in addrs {
                let ip = addr.parse::<IpAddr>().map_err(|e| {
                    Error::Config(format!("invalid address '{}' for host {}: {}", addr, host, e))
                })?;
                resolver.insert(ip, host.clone());
            }
        }
        Ok(resolver)
    }

    pub fn insert(&mut self, ip: IpAddr, host: impl Into<String>) {
        self.hosts.insert(ip, host.into());
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }
}

impl HostResolver for StaticHostResolver {
    fn resolve(&self, ip: IpAddr) -> Option<String> {
        self.hosts.get(&ip).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_table() {
        let mut table = BTreeMap::new();
        table.insert("pbx-1".to_string(), vec!["10.0.0.1".to_string(), "::1".to_string()]);

        let resolver = StaticHostResolver::from_table(&table).unwrap();
        assert_eq!(resolver.len(), 2);
        assert_eq!(resolver.resolve("::1".parse().unwrap()).as_deref(), Some("pbx-1"));
        assert_eq!(resolver.resolve("10.0.0.9".parse().unwrap()), None);
    }

    #[test]
    fn test_from_table_rejects_garbage() {
        let mut table = BTreeMap::new();
        table.insert("pbx-1".to_string(), vec!["pbx.local".to_string()]);
        assert!(StaticHostResolver::from_table(&table).unwrap_err().is_fatal());
    }
}

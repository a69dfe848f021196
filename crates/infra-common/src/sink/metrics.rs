use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;

/// Metric attributes, ordered so equal sets compare equal
pub type Attributes = BTreeMap<String, String>;

/// Receiver of counters, summaries and timers
pub trait MetricsSink: Send + Sync {
    /// Add `value` to a counter
    fn counter(&self, name: &str, value: u64, attributes: &Attributes);

    /// Record one observation of a distribution
    fn summary(&self, name: &str, value: f64, attributes: &Attributes);

    /// Record a duration
    fn timer(&self, name: &str, elapsed: Duration, attributes: &Attributes);
}

/// Sink that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn counter(&self, _name: &str, _value: u64, _attributes: &Attributes) {}
    fn summary(&self, _name: &str, _value: f64, _attributes: &Attributes) {}
    fn timer(&self, _name: &str, _elapsed: Duration, _attributes: &Attributes) {}
}

/// Metric identity: name plus attribute set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MetricKey {
    pub name: String,
    pub attributes: Attributes,
}

impl MetricKey {
    pub fn new(name: &str, attributes: &Attributes) -> Self {
        Self {
            name: name.to_string(),
            attributes: attributes.clone(),
        }
    }
}

/// Aggregated observations
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Summary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl Summary {
    fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    /// Mean of the observations, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            min: 0.0,
            max: 0.0,
        }
    }
}

/// Point-in-time copy of a [`MetricsRegistry`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    pub counters: BTreeMap<MetricKey, u64>,
    /// Summaries and timers; timers are recorded in milliseconds
    pub summaries: BTreeMap<MetricKey, Summary>,
}

impl MetricsSnapshot {
    /// Sum of a counter across all attribute sets
    pub fn counter_total(&self, name: &str) -> u64 {
        self.counters
            .iter()
            .filter(|(k, _)| k.name == name)
            .map(|(_, v)| *v)
            .sum()
    }

    /// Counter value for an exact attribute set
    pub fn counter(&self, name: &str, attributes: &Attributes) -> u64 {
        self.counters
            .get(&MetricKey::new(name, attributes))
            .copied()
            .unwrap_or(0)
    }

    /// Observations of a summary or timer across all attribute sets
    pub fn summary_count(&self, name: &str) -> u64 {
        self.summaries
            .iter()
            .filter(|(k, _)| k.name == name)
            .map(|(_, s)| s.count)
            .sum()
    }

    /// Summary for an exact attribute set
    pub fn summary(&self, name: &str, attributes: &Attributes) -> Option<Summary> {
        self.summaries.get(&MetricKey::new(name, attributes)).copied()
    }
}

/// In-process metrics store
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: Mutex<HashMap<MetricKey, u64>>,
    summaries: Mutex<HashMap<MetricKey, Summary>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy current values
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            counters: self
                .counters
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            summaries: self
                .summaries
                .lock()
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
        }
    }
}

impl MetricsSink for MetricsRegistry {
    fn counter(&self, name: &str, value: u64, attributes: &Attributes) {
        let mut counters = self.counters.lock();
        let entry = counters.entry(MetricKey::new(name, attributes)).or_insert(0);
        *entry = entry.saturating_add(value);
    }

    fn summary(&self, name: &str, value: f64, attributes: &Attributes) {
        self.summaries
            .lock()
            .entry(MetricKey::new(name, attributes))
            .or_default()
            .observe(value);
    }

    fn timer(&self, name: &str, elapsed: Duration, attributes: &Attributes) {
        self.summary(name, elapsed.as_secs_f64() * 1000.0, attributes);
    }
}

impl<S: MetricsSink + ?Sized> MetricsSink for std::sync::Arc<S> {
    fn counter(&self, name: &str, value: u64, attributes: &Attributes) {
        (**self).counter(name, value, attributes)
    }

    fn summary(&self, name: &str, value: f64, attributes: &Attributes) {
        (**self).summary(name, value, attributes)
    }

    fn timer(&self, name: &str, elapsed: Duration, attributes: &Attributes) {
        (**self).timer(name, elapsed, attributes)
    }
}

/// Build an attribute set from string pairs
pub fn attributes<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Attributes {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

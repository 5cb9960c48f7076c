use std::{fmt::Display, time::SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Namespace of all metrics recorded by this crate
pub const SHARDFLOW_NAMESPACE: &str = "shardflow";

/// Name of a metric within a namespace
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricName {
    /// Namespace, usually the component recording the metric
    pub namespace: String,
    /// Name within the namespace
    pub name: String,
}

impl MetricName {
    /// Create a metric name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// A name in the [SHARDFLOW_NAMESPACE]
    pub fn shardflow(name: impl Into<String>) -> Self {
        Self::new(SHARDFLOW_NAMESPACE, name)
    }
}

impl Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// A metric name together with the step which recorded it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricKey {
    /// Name of the step (vertex) recording the metric
    pub step: String,
    /// The metric
    pub metric: MetricName,
}

/// A counter which may be incremented and decremented
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter(i64);

impl Counter {
    /// Increment by one
    pub fn inc(&mut self) {
        self.inc_by(1)
    }

    /// Increment by `n`
    pub fn inc_by(&mut self, n: i64) {
        self.0 = self.0.saturating_add(n);
    }

    /// Decrement by one
    pub fn dec(&mut self) {
        self.dec_by(1)
    }

    /// Decrement by `n`
    pub fn dec_by(&mut self, n: i64) {
        self.0 = self.0.saturating_sub(n);
    }

    /// Current count
    pub fn value(&self) -> i64 {
        self.0
    }
}

/// Summary of all values recorded in a [Distribution]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionResult {
    /// Sum of values
    pub sum: i64,
    /// Count of values
    pub count: i64,
    /// Smallest value
    pub min: i64,
    /// Largest value
    pub max: i64,
}

impl DistributionResult {
    /// Distribution of a single value
    pub fn single(value: i64) -> Self {
        Self {
            sum: value,
            count: 1,
            min: value,
            max: value,
        }
    }

    /// Combine two distributions into one
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            sum: self.sum.saturating_add(other.sum),
            count: self.count.saturating_add(other.count),
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Arithmetic mean of all values
    pub fn mean(&self) -> f64 {
        self.sum as f64 / self.count as f64
    }
}

/// A metric recording the distribution of values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Distribution(Option<DistributionResult>);

impl Distribution {
    /// Record a value
    pub fn update(&mut self, value: i64) {
        let single = DistributionResult::single(value);
        self.0 = Some(match self.0 {
            Some(x) => x.merge(&single),
            None => single,
        });
    }

    /// Summary of all recorded values, `None` if nothing was recorded
    pub fn result(&self) -> Option<DistributionResult> {
        self.0
    }
}

/// Value of a [Gauge] at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GaugeResult {
    /// The value
    pub value: i64,
    /// When the value was set
    pub timestamp: SystemTime,
}

/// A metric reporting the latest value set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Gauge(Option<GaugeResult>);

impl Gauge {
    /// Set the current value
    pub fn set(&mut self, value: i64) {
        self.0 = Some(GaugeResult {
            value,
            timestamp: SystemTime::now(),
        });
    }

    /// Latest value, `None` if never set
    pub fn result(&self) -> Option<GaugeResult> {
        self.0
    }
}

/// A single metric value attributed to a key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricUpdate<T> {
    /// What was measured, and where
    pub key: MetricKey,
    /// The measurement
    pub value: T,
}

/// Everything a single processor recorded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricUpdates {
    /// Counter values
    pub counters: Vec<MetricUpdate<i64>>,
    /// Distribution summaries
    pub distributions: Vec<MetricUpdate<DistributionResult>>,
    /// Gauge values
    pub gauges: Vec<MetricUpdate<GaugeResult>>,
}

impl MetricUpdates {
    /// True if there are no updates at all
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.distributions.is_empty() && self.gauges.is_empty()
    }
}

/// Metric cells of a single processor, all attributed to one step
#[derive(Debug, Clone)]
pub struct MetricsContainer {
    step: String,
    counters: IndexMap<MetricName, Counter>,
    distributions: IndexMap<MetricName, Distribution>,
    gauges: IndexMap<MetricName, Gauge>,
}

impl MetricsContainer {
    /// Create an empty container for `step`
    pub fn new(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            counters: IndexMap::new(),
            distributions: IndexMap::new(),
            gauges: IndexMap::new(),
        }
    }

    /// Step all metrics of this container are attributed to
    pub fn step(&self) -> &str {
        &self.step
    }

    /// Get the counter `name`, creating it if it does not exist
    pub fn counter(&mut self, name: MetricName) -> &mut Counter {
        self.counters.entry(name).or_default()
    }

    /// Get the distribution `name`, creating it if it does not exist
    pub fn distribution(&mut self, name: MetricName) -> &mut Distribution {
        self.distributions.entry(name).or_default()
    }

    /// Get the gauge `name`, creating it if it does not exist
    pub fn gauge(&mut self, name: MetricName) -> &mut Gauge {
        self.gauges.entry(name).or_default()
    }

    /// Current value of every cell. Cells which never recorded a value are left out,
    /// counters are always included.
    pub fn updates(&self) -> MetricUpdates {
        let key = |name: &MetricName| MetricKey {
            step: self.step.clone(),
            metric: name.clone(),
        };
        MetricUpdates {
            counters: self
                .counters
                .iter()
                .map(|(n, c)| MetricUpdate {
                    key: key(n),
                    value: c.value(),
                })
                .collect(),
            distributions: self
                .distributions
                .iter()
                .filter_map(|(n, d)| {
                    d.result().map(|value| MetricUpdate { key: key(n), value })
                })
                .collect(),
            gauges: self
                .gauges
                .iter()
                .filter_map(|(n, g)| {
                    g.result().map(|value| MetricUpdate { key: key(n), value })
                })
                .collect(),
        }
    }
}

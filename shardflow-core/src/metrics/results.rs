//! Querying the metrics of a job.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bon::Builder;
use indexmap::IndexMap;

use super::{DistributionResult, GaugeResult, MetricKey, MetricUpdates, MetricsAccumulator};

/// Selects metrics for a query. An empty filter selects everything.
///
/// # Usage
///
/// ```
/// use shardflow::metrics::{MetricNameFilter, MetricsFilter};
///
/// let filter = MetricsFilter::builder()
///     .step("read")
///     .name(MetricNameFilter::named("shardflow", "elements-read"))
///     .build();
/// ```
#[derive(Debug, Clone, Default, Builder)]
pub struct MetricsFilter {
    /// A metric matches if its step contains any of these
    #[builder(field)]
    steps: Vec<String>,
    /// A metric matches if its name matches any of these
    #[builder(field)]
    names: Vec<MetricNameFilter>,
}

impl<S: metrics_filter_builder::State> MetricsFilterBuilder<S> {
    /// Only select metrics of steps whose name contains `step`
    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.steps.push(step.into());
        self
    }

    /// Only select metrics matching `filter`
    pub fn name(mut self, filter: MetricNameFilter) -> Self {
        self.names.push(filter);
        self
    }
}

impl MetricsFilter {
    /// True if the metric identified by `key` is selected by this filter
    pub fn matches(&self, key: &MetricKey) -> bool {
        let step_matches =
            self.steps.is_empty() || self.steps.iter().any(|s| key.step.contains(s.as_str()));
        let name_matches = self.names.is_empty()
            || self.names.iter().any(|n| {
                n.namespace == key.metric.namespace
                    && n.name.as_ref().map_or(true, |x| *x == key.metric.name)
            });
        step_matches && name_matches
    }
}

/// Matches metric names by namespace and optionally name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricNameFilter {
    namespace: String,
    name: Option<String>,
}

impl MetricNameFilter {
    /// Match all metrics in `namespace`
    pub fn in_namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: None,
        }
    }

    /// Match exactly one metric name
    pub fn named(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: Some(name.into()),
        }
    }
}

/// The aggregated value of a metric
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricResult<T> {
    /// What was measured, and where
    pub key: MetricKey,
    /// Value aggregated over all processors
    pub value: T,
}

/// Result of [MetricResults::query_metrics]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricQueryResults {
    /// Counters, summed over all processors
    pub counters: Vec<MetricResult<i64>>,
    /// Distributions, merged over all processors
    pub distributions: Vec<MetricResult<DistributionResult>>,
    /// Gauges, the most recently set value of any processor
    pub gauges: Vec<MetricResult<GaugeResult>>,
}

impl MetricQueryResults {
    /// True if the query selected nothing
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty() && self.distributions.is_empty() && self.gauges.is_empty()
    }
}

/// Access to the metrics of a job
pub trait MetricResults: Send + Sync {
    /// All metrics selected by `filter`
    fn query_metrics(&self, filter: &MetricsFilter) -> MetricQueryResults;
}

/// Live metrics of a job, updated whenever a processor reports to the
/// [MetricsAccumulator] this was created from
#[derive(Clone, Default)]
pub struct JobMetricResults {
    entries: Arc<Mutex<IndexMap<String, MetricUpdates>>>,
}

impl JobMetricResults {
    /// Create results which receive every entry put into `accumulator`,
    /// including the entries already present
    pub fn listening_to(accumulator: &MetricsAccumulator) -> Self {
        let results = Self::default();
        let entries = Arc::clone(&results.entries);
        accumulator.add_entry_listener(move |key: &str, updates: &MetricUpdates| {
            entries
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key.to_string(), updates.clone());
        });
        results
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, MetricUpdates>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MetricResults for JobMetricResults {
    fn query_metrics(&self, filter: &MetricsFilter) -> MetricQueryResults {
        let guard = self.lock();
        let mut counters: IndexMap<MetricKey, i64> = IndexMap::new();
        let mut distributions: IndexMap<MetricKey, DistributionResult> = IndexMap::new();
        let mut gauges: IndexMap<MetricKey, GaugeResult> = IndexMap::new();

        for updates in guard.values() {
            for c in updates.counters.iter().filter(|x| filter.matches(&x.key)) {
                let sum = counters.entry(c.key.clone()).or_default();
                *sum = sum.saturating_add(c.value);
            }
            for d in updates.distributions.iter().filter(|x| filter.matches(&x.key)) {
                distributions
                    .entry(d.key.clone())
                    .and_modify(|x| *x = x.merge(&d.value))
                    .or_insert(d.value);
            }
            for g in updates.gauges.iter().filter(|x| filter.matches(&x.key)) {
                gauges
                    .entry(g.key.clone())
                    .and_modify(|x| {
                        if g.value.timestamp >= x.timestamp {
                            *x = g.value
                        }
                    })
                    .or_insert(g.value);
            }
        }

        MetricQueryResults {
            counters: counters
                .into_iter()
                .map(|(key, value)| MetricResult { key, value })
                .collect(),
            distributions: distributions
                .into_iter()
                .map(|(key, value)| MetricResult { key, value })
                .collect(),
            gauges: gauges
                .into_iter()
                .map(|(key, value)| MetricResult { key, value })
                .collect(),
        }
    }
}

/// Metrics of a job which never ran. Every query is empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyMetricResults;

impl MetricResults for EmptyMetricResults {
    fn query_metrics(&self, _filter: &MetricsFilter) -> MetricQueryResults {
        MetricQueryResults::default()
    }
}

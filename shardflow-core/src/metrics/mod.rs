//! Metrics of a running job.
//!
//! Every processor records into its own [MetricsContainer]. On close the
//! container is flushed as [MetricUpdates] into the job's [MetricsAccumulator],
//! where [JobMetricResults] listens for entries and aggregates them for queries.
mod accumulator;
mod cells;
mod results;

pub use accumulator::{EntryListener, MetricsAccumulator, MetricsReporter};
pub use cells::{
    Counter, Distribution, DistributionResult, Gauge, GaugeResult, MetricKey, MetricName,
    MetricUpdate, MetricUpdates, MetricsContainer, SHARDFLOW_NAMESPACE,
};
pub use results::{
    EmptyMetricResults, JobMetricResults, MetricNameFilter, MetricQueryResults, MetricResult,
    MetricResults, MetricsFilter,
};

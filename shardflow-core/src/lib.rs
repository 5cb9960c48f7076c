//! Shardflow provides the bounded-read and side-input building blocks of a
//! cooperative dataflow engine: splitting bounded sources into shards and
//! reading them in parallel, materializing windowed side inputs in a single
//! cluster wide instance, and observing submitted jobs through a small run
//! state and live metrics.
pub mod config;
pub mod job;
pub mod metrics;
pub mod processor;
pub mod runtime;
pub mod sources;
pub mod traverser;
pub mod types;
pub mod view;

#[cfg(test)]
pub(crate) mod testing;

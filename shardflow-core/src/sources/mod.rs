//! Bounded sources and the machinery to read them in parallel.
//!
//! A [BoundedSource] is split into shards once on the control plane by the
//! [SourcePartitioner]. Shards are distributed round robin, first over members,
//! then over the [SourceWorker]s of each member. Every worker reads its shards
//! one after another, one record per pull.
use thiserror::Error;

use crate::{
    config::JobOptions,
    types::{Data, Instant},
};

mod partitioner;
mod vec_source;
mod worker;

pub use partitioner::{
    desired_shard_size, round_robin_sub_list, PartitionError, SourcePartitioner, SourceSupplier,
};
pub use vec_source::{VecReader, VecSource};
pub use worker::{SourceWorker, WorkerPhase};

/// A finite source of data which can split itself into shards.
/// Shards returned by [BoundedSource::split] are sources themselves.
pub trait BoundedSource: Clone + Send + Sync + 'static {
    /// Values produced by this source
    type Output: Data;
    /// Reader over a single shard
    type Reader: BoundedReader<Output = Self::Output>;

    /// Estimated size of all data in this source, in bytes
    fn estimated_size_bytes(&self, options: &JobOptions) -> Result<u64, SourceError>;

    /// Split the source into shards of approximately `desired_shard_size_bytes`.
    /// Together the returned shards must cover exactly the data of this source.
    fn split(
        &self,
        desired_shard_size_bytes: u64,
        options: &JobOptions,
    ) -> Result<Vec<Self>, SourceError>;

    /// Create a reader over the data of this source
    fn create_reader(&self, options: &JobOptions) -> Result<Self::Reader, SourceError>;
}

/// Cursor over the data of a single shard.
///
/// A reader starts unpositioned. [BoundedReader::start] moves it onto the first
/// record and [BoundedReader::advance] onto the following ones. Both return
/// `Ok(false)` once there is no record to move onto, leaving the reader exhausted.
pub trait BoundedReader: Send + 'static {
    /// Values produced by this reader
    type Output;

    /// Position the reader on the first record, `Ok(false)` if there is none
    fn start(&mut self) -> Result<bool, SourceError>;

    /// Move to the next record, `Ok(false)` if there is none
    fn advance(&mut self) -> Result<bool, SourceError>;

    /// The record the reader is positioned on
    fn current(&self) -> Result<Self::Output, SourceError>;

    /// Event time of the record the reader is positioned on
    fn current_timestamp(&self) -> Result<Instant, SourceError>;

    /// Release all resources held by the reader
    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

/// Failures of a source or reader
#[derive(Debug, Error)]
pub enum SourceError {
    /// IO failure of the underlying storage
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// `current` called on an unstarted or exhausted reader
    #[error("Reader is not positioned on a record")]
    NoCurrent,
    /// Any other failure, described by the source
    #[error("Source failed: {0}")]
    Custom(String),
}

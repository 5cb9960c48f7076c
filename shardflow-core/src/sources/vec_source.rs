use std::{ops::Range, sync::Arc};

use crate::{
    config::JobOptions,
    types::{Data, Instant},
};

use super::{BoundedReader, BoundedSource, SourceError};

/// A bounded source over an in-memory collection of timestamped records.
///
/// The size of every record is estimated as `size_of::<T>()`, so splitting
/// produces shards of `desired_shard_size_bytes / size_of::<T>()` consecutive
/// records (at least one).
///
/// # Example
/// ```rust
/// use shardflow::config::JobOptions;
/// use shardflow::sources::{BoundedSource, VecSource};
///
/// let source = VecSource::from_values(0u64..100);
/// let options = JobOptions::default();
/// // 8 bytes per u64, 80 bytes per shard
/// let shards = source.split(80, &options).unwrap();
/// assert_eq!(shards.len(), 10);
/// ```
#[derive(Debug, Clone)]
pub struct VecSource<T> {
    records: Arc<[(T, Instant)]>,
    range: Range<usize>,
}

impl<T> VecSource<T> {
    /// Create a source from timestamped records
    pub fn new(records: impl IntoIterator<Item = (T, Instant)>) -> Self {
        let records: Arc<[(T, Instant)]> = records.into_iter().collect();
        let range = 0..records.len();
        Self { records, range }
    }

    /// Create a source from values, timestamping each value with its index
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        Self::new(
            values
                .into_iter()
                .enumerate()
                .map(|(i, v)| (v, Instant::from_millis(i as i64))),
        )
    }

    /// Iterate over all records of this source
    pub fn iter(&self) -> impl Iterator<Item = &(T, Instant)> {
        self.records[self.range.clone()].iter()
    }

    /// Count of records in this source
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// True if this source has no records
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    fn record_size() -> u64 {
        std::mem::size_of::<T>().max(1) as u64
    }
}

impl<T> BoundedSource for VecSource<T>
where
    T: Data + Sync,
{
    type Output = T;
    type Reader = VecReader<T>;

    fn estimated_size_bytes(&self, _options: &JobOptions) -> Result<u64, SourceError> {
        Ok(self.len() as u64 * Self::record_size())
    }

    fn split(
        &self,
        desired_shard_size_bytes: u64,
        _options: &JobOptions,
    ) -> Result<Vec<Self>, SourceError> {
        let per_shard = (desired_shard_size_bytes / Self::record_size()).max(1);
        let per_shard = usize::try_from(per_shard).unwrap_or(usize::MAX);
        let end = self.range.end;
        Ok(self
            .range
            .clone()
            .step_by(per_shard)
            .map(|start| VecSource {
                records: Arc::clone(&self.records),
                range: start..start.saturating_add(per_shard).min(end),
            })
            .collect())
    }

    fn create_reader(&self, _options: &JobOptions) -> Result<Self::Reader, SourceError> {
        Ok(VecReader {
            records: Arc::clone(&self.records),
            range: self.range.clone(),
            position: None,
        })
    }
}

/// Reader over a [VecSource] shard
#[derive(Debug)]
pub struct VecReader<T> {
    records: Arc<[(T, Instant)]>,
    range: Range<usize>,
    // None if unstarted or exhausted
    position: Option<usize>,
}

impl<T> VecReader<T> {
    fn record(&self) -> Result<&(T, Instant), SourceError> {
        self.position
            .and_then(|i| self.records.get(i))
            .ok_or(SourceError::NoCurrent)
    }
}

impl<T> BoundedReader for VecReader<T>
where
    T: Data + Sync,
{
    type Output = T;

    fn start(&mut self) -> Result<bool, SourceError> {
        self.position = (!self.range.is_empty()).then_some(self.range.start);
        Ok(self.position.is_some())
    }

    fn advance(&mut self) -> Result<bool, SourceError> {
        self.position = self
            .position
            .map(|i| i + 1)
            .filter(|i| self.range.contains(i));
        Ok(self.position.is_some())
    }

    fn current(&self) -> Result<Self::Output, SourceError> {
        self.record().map(|x| x.0.clone())
    }

    fn current_timestamp(&self) -> Result<Instant, SourceError> {
        self.record().map(|x| x.1)
    }

    fn close(&mut self) -> Result<(), SourceError> {
        self.position = None;
        Ok(())
    }
}

//! Helpers shared by the unit tests of this crate.
use std::time::Duration;

use crate::{
    config::JobOptions,
    processor::{Outbox, Processor, ProcessorContext, ProcessorError},
    sources::{BoundedReader, BoundedSource, SourceError},
    types::Instant,
};

/// Context of the only processor on the only member
pub(crate) fn test_context() -> ProcessorContext {
    ProcessorContext {
        vertex_name: "test".into(),
        member_index: 0,
        member_count: 1,
        local_parallelism: 1,
        local_index: 0,
        metrics: None,
    }
}

/// Call `complete` on an initialized processor until it is done, draining an
/// outbox of the given capacity after every turn.
///
/// **PANIC:** if the processor needs more than 100_000 turns
pub(crate) fn drive_to_completion<P: Processor>(
    processor: &mut P,
    outbox_capacity: usize,
) -> Result<Vec<P::Output>, ProcessorError> {
    let mut outbox = Outbox::new(outbox_capacity);
    let mut collected = Vec::new();
    for _ in 0..100_000 {
        let done = processor.complete(&mut outbox)?;
        collected.extend(outbox.drain());
        if done {
            return Ok(collected);
        }
    }
    panic!("Processor did not complete")
}

#[derive(Debug, Clone, Copy)]
enum Failure {
    Estimate,
    Split,
    ReadAfter(u64),
}

/// A source failing at a chosen point
#[derive(Debug, Clone)]
pub(crate) struct FailingSource {
    failure: Failure,
}

impl FailingSource {
    /// Fails estimating its size
    pub(crate) fn estimate() -> Self {
        Self {
            failure: Failure::Estimate,
        }
    }

    /// Fails splitting
    pub(crate) fn split() -> Self {
        Self {
            failure: Failure::Split,
        }
    }

    /// Reads `n` records, then fails advancing the reader
    pub(crate) fn read_after(n: u64) -> Self {
        Self {
            failure: Failure::ReadAfter(n),
        }
    }
}

impl BoundedSource for FailingSource {
    type Output = u64;
    type Reader = FailingReader;

    fn estimated_size_bytes(&self, _options: &JobOptions) -> Result<u64, SourceError> {
        match self.failure {
            Failure::Estimate => Err(SourceError::Custom("estimate".into())),
            _ => Ok(8),
        }
    }

    fn split(
        &self,
        _desired_shard_size_bytes: u64,
        _options: &JobOptions,
    ) -> Result<Vec<Self>, SourceError> {
        match self.failure {
            Failure::Split => Err(SourceError::Custom("split".into())),
            _ => Ok(vec![self.clone()]),
        }
    }

    fn create_reader(&self, _options: &JobOptions) -> Result<Self::Reader, SourceError> {
        let records = match self.failure {
            Failure::ReadAfter(n) => n,
            _ => 0,
        };
        Ok(FailingReader {
            records,
            position: 0,
        })
    }
}

/// Reader of a [FailingSource]
#[derive(Debug)]
pub(crate) struct FailingReader {
    records: u64,
    position: u64,
}

impl BoundedReader for FailingReader {
    type Output = u64;

    fn start(&mut self) -> Result<bool, SourceError> {
        if self.records == 0 {
            return Err(SourceError::Custom("start".into()));
        }
        Ok(true)
    }

    fn advance(&mut self) -> Result<bool, SourceError> {
        self.position += 1;
        if self.position >= self.records {
            return Err(SourceError::Custom("advance".into()));
        }
        Ok(true)
    }

    fn current(&self) -> Result<Self::Output, SourceError> {
        Ok(self.position)
    }

    fn current_timestamp(&self) -> Result<Instant, SourceError> {
        Ok(Instant::from_millis(self.position as i64))
    }
}

/// A source which never runs out of records, reading one per millisecond
#[derive(Debug, Clone, Copy)]
pub(crate) struct EndlessSource;

impl BoundedSource for EndlessSource {
    type Output = u64;
    type Reader = EndlessReader;

    fn estimated_size_bytes(&self, _options: &JobOptions) -> Result<u64, SourceError> {
        Ok(u64::MAX)
    }

    fn split(
        &self,
        _desired_shard_size_bytes: u64,
        _options: &JobOptions,
    ) -> Result<Vec<Self>, SourceError> {
        Ok(vec![*self])
    }

    fn create_reader(&self, _options: &JobOptions) -> Result<Self::Reader, SourceError> {
        Ok(EndlessReader(0))
    }
}

/// Reader of an [EndlessSource]
#[derive(Debug)]
pub(crate) struct EndlessReader(u64);

impl BoundedReader for EndlessReader {
    type Output = u64;

    fn start(&mut self) -> Result<bool, SourceError> {
        Ok(true)
    }

    fn advance(&mut self) -> Result<bool, SourceError> {
        std::thread::sleep(Duration::from_millis(1));
        self.0 += 1;
        Ok(true)
    }

    fn current(&self) -> Result<Self::Output, SourceError> {
        Ok(self.0)
    }

    fn current_timestamp(&self) -> Result<Instant, SourceError> {
        Ok(Instant::from_millis(self.0 as i64))
    }
}

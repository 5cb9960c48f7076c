//! The processor reading the shards assigned to it.
use tracing::{debug, trace};

use crate::{
    config::{JobOptions, SerializableOptions},
    metrics::{MetricName, MetricsContainer, MetricsReporter},
    processor::{Emitter, Outbox, Processor, ProcessorContext, ProcessorError},
    traverser::Traverser,
    types::WindowedValue,
};

use super::{BoundedReader, BoundedSource};

/// What a [SourceWorker] is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    /// Not yet initialized
    Initializing,
    /// A reader is positioned on a record
    DrainingShard,
    /// The previous shard is exhausted and the next one is being started
    BetweenShards,
    /// All shards are exhausted
    Drained,
}

/// Cooperative processor reading a list of shards one record at a time.
///
/// Every record is emitted as a [WindowedValue] in the global window carrying
/// the reader's timestamp. When the outbox is full the worker returns and
/// continues from the very same record on its next turn.
///
/// Shards whose reader has no first record are skipped. Any read error is
/// fatal to the worker.
pub struct SourceWorker<S: BoundedSource> {
    drain: ShardDrain<S>,
    emitter: Emitter<WindowedValue<S::Output>>,
    options: SerializableOptions,
    owner_id: String,
    reporter: Option<MetricsReporter>,
}

impl<S> SourceWorker<S>
where
    S: BoundedSource,
{
    pub(crate) fn new(shards: Vec<S>, options: SerializableOptions, owner_id: String) -> Self {
        Self {
            drain: ShardDrain {
                shards: shards.into_iter(),
                options: None,
                current: None,
                phase: WorkerPhase::Initializing,
                metrics: MetricsContainer::new(owner_id.clone()),
            },
            emitter: Emitter::default(),
            options,
            owner_id,
            reporter: None,
        }
    }

    /// Current phase of this worker
    pub fn phase(&self) -> WorkerPhase {
        self.drain.phase
    }

    /// Shards not yet started by this worker
    pub fn pending_shards(&self) -> &[S] {
        self.drain.shards.as_slice()
    }
}

impl<S> Processor for SourceWorker<S>
where
    S: BoundedSource,
{
    type Input = ();
    type Output = WindowedValue<S::Output>;

    fn init(&mut self, ctx: &ProcessorContext) -> Result<(), ProcessorError> {
        debug!(
            owner = %self.owner_id,
            worker = ctx.global_index(),
            shards = self.drain.shards.len(),
            "Initializing source worker"
        );
        self.reporter = ctx.metrics_reporter();
        self.drain.options = Some(self.options.get()?);
        self.drain.next_shard()
    }

    fn complete(&mut self, outbox: &mut Outbox<Self::Output>) -> Result<bool, ProcessorError> {
        if self.drain.phase == WorkerPhase::Initializing {
            return Err(ProcessorError::NotInitialized);
        }
        let done = self.emitter.emit_from_traverser(&mut self.drain, outbox)?;
        if let Some(reporter) = self.reporter.as_ref() {
            reporter.report(&self.drain.metrics);
        }
        Ok(done)
    }

    fn close(&mut self) -> Result<(), ProcessorError> {
        if let Some(mut reader) = self.drain.current.take() {
            reader.close()?;
        }
        if let Some(reporter) = self.reporter.take() {
            reporter.report(&self.drain.metrics);
        }
        Ok(())
    }
}

/// Reading state of a [SourceWorker], separate from its emitter so the worker
/// can drive itself as a [Traverser]
struct ShardDrain<S: BoundedSource> {
    shards: std::vec::IntoIter<S>,
    options: Option<JobOptions>,
    // reader positioned on the next record to emit
    current: Option<S::Reader>,
    phase: WorkerPhase,
    metrics: MetricsContainer,
}

impl<S> ShardDrain<S>
where
    S: BoundedSource,
{
    /// Close the current reader if any and start the next shard which has at
    /// least one record
    fn next_shard(&mut self) -> Result<(), ProcessorError> {
        self.phase = WorkerPhase::BetweenShards;
        if let Some(mut reader) = self.current.take() {
            reader.close()?;
        }
        let options = self.options.as_ref().ok_or(ProcessorError::NotInitialized)?;
        for shard in self.shards.by_ref() {
            let mut reader = shard.create_reader(options)?;
            if reader.start()? {
                self.current = Some(reader);
                self.phase = WorkerPhase::DrainingShard;
                return Ok(());
            }
            trace!("Skipping empty shard");
            reader.close()?;
        }
        self.phase = WorkerPhase::Drained;
        Ok(())
    }
}

impl<S> Traverser<WindowedValue<S::Output>> for ShardDrain<S>
where
    S: BoundedSource,
{
    type Error = ProcessorError;

    fn next(&mut self) -> Result<Option<WindowedValue<S::Output>>, Self::Error> {
        let Some(reader) = self.current.as_mut() else {
            return Ok(None);
        };
        let value = reader.current()?;
        let timestamp = reader.current_timestamp()?;
        let record = WindowedValue::timestamped_in_global_window(value, timestamp);
        self.metrics
            .counter(MetricName::shardflow("elements-read"))
            .inc();
        if !reader.advance()? {
            self.next_shard()?;
        }
        Ok(Some(record))
    }
}

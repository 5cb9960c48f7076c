//! The cooperative processor contract.
//!
//! Processors are driven by an external scheduler which calls them repeatedly.
//! Every call must return promptly: a processor emits into a bounded [Outbox]
//! and returns `Ok(false)` from [Processor::complete] as soon as the outbox is
//! full, keeping all state to resume on its next turn.
use std::collections::VecDeque;

use thiserror::Error;

use crate::{
    config::OptionsError,
    metrics::{MetricsAccumulator, MetricsReporter},
    sources::SourceError,
    traverser::Traverser,
    types::PaneInfo,
};

mod singleton;
mod supplier;

pub use singleton::{
    force_total_parallelism_one, rendezvous_select, ForceTotalParallelismOne, SingletonError,
    SingletonProcessor, SingletonSupplier,
};
pub use supplier::{
    MemberAddress, MetaSupplierContext, ProcessorMetaSupplier, ProcessorSupplier, SupplierContext,
};

/// A unit of cooperative work
pub trait Processor: Send + 'static {
    /// Items this processor receives from upstream
    type Input;
    /// Items this processor emits
    type Output;

    /// Called once before any other method
    fn init(&mut self, _ctx: &ProcessorContext) -> Result<(), ProcessorError> {
        Ok(())
    }

    /// Process a single inbound item received on the given input ordinal.
    /// Processing must be synchronous and must not emit output.
    fn process(&mut self, _ordinal: usize, _item: Self::Input) -> Result<(), ProcessorError> {
        Err(ProcessorError::UnexpectedInput)
    }

    /// Called repeatedly after all inputs are exhausted.
    /// Returns `Ok(true)` once the processor has emitted all its output,
    /// `Ok(false)` if it must be called again.
    fn complete(&mut self, outbox: &mut Outbox<Self::Output>) -> Result<bool, ProcessorError>;

    /// Release all resources held by this processor. Must be idempotent
    fn close(&mut self) -> Result<(), ProcessorError> {
        Ok(())
    }
}

/// Information about where in the cluster a processor runs
#[derive(Debug, Clone)]
pub struct ProcessorContext {
    /// Name of the vertex this processor belongs to
    pub vertex_name: String,
    /// Index of the member this processor runs on
    pub member_index: usize,
    /// Members in the cluster
    pub member_count: usize,
    /// Processors of this vertex on each member
    pub local_parallelism: usize,
    /// Index of this processor among the processors on its member
    pub local_index: usize,
    /// Accumulator processors report their metrics to
    pub metrics: Option<MetricsAccumulator>,
}

impl ProcessorContext {
    /// Index of this processor among all processors of the vertex cluster wide
    pub fn global_index(&self) -> usize {
        self.member_index * self.local_parallelism + self.local_index
    }

    /// Processors of the vertex cluster wide
    pub fn total_parallelism(&self) -> usize {
        self.member_count * self.local_parallelism
    }

    /// A reporter publishing metrics under a key unique to this processor,
    /// `None` if the job does not collect metrics
    pub fn metrics_reporter(&self) -> Option<MetricsReporter> {
        self.metrics.as_ref().map(|acc| {
            MetricsReporter::new(
                acc.clone(),
                format!("{}#{}", self.vertex_name, self.global_index()),
            )
        })
    }
}

/// Bounded buffer a processor emits into.
/// The scheduler drains the outbox between turns.
#[derive(Debug)]
pub struct Outbox<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> Outbox<T> {
    /// Create an outbox accepting at most `capacity` items between drains.
    ///
    /// **PANIC:** if capacity is 0
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Outbox capacity must be at least 1");
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Offer an item to the outbox, handing it back if the outbox is full
    pub fn offer(&mut self, item: T) -> Result<(), T> {
        if self.has_room() {
            self.items.push_back(item);
            Ok(())
        } else {
            Err(item)
        }
    }

    /// True if another item would be accepted
    #[inline]
    pub fn has_room(&self) -> bool {
        self.items.len() < self.capacity
    }

    /// Take all buffered items out of the outbox
    pub fn drain(&mut self) -> std::collections::vec_deque::Drain<'_, T> {
        self.items.drain(..)
    }

    /// Count of buffered items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if no items are buffered
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Moves items from a [Traverser] into an [Outbox], holding on to the one item
/// the outbox refused until the next call.
#[derive(Debug)]
pub struct Emitter<T> {
    pending: Option<T>,
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<T> Emitter<T> {
    /// Emit items until either the traverser is exhausted, returning `Ok(true)`,
    /// or the outbox is full, returning `Ok(false)`.
    pub fn emit_from_traverser<Tr>(
        &mut self,
        traverser: &mut Tr,
        outbox: &mut Outbox<T>,
    ) -> Result<bool, Tr::Error>
    where
        Tr: Traverser<T>,
    {
        loop {
            let item = match self.pending.take() {
                Some(x) => x,
                None => match traverser.next()? {
                    Some(x) => x,
                    None => return Ok(true),
                },
            };
            if let Err(refused) = outbox.offer(item) {
                self.pending = Some(refused);
                return Ok(false);
            }
        }
    }

    /// True if an item is waiting for room in the outbox
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Failures of a processor. All of these are fatal to the processor and
/// expected to fail the job.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// A reader failed
    #[error("Error reading from shard")]
    Read(#[from] SourceError),
    /// Input carried a pane other than the single on-time firing
    #[error("Received pane {found:?} but exactly one firing per window is supported")]
    PaneMismatch { found: PaneInfo },
    /// Input was delivered to a processor without inputs
    #[error("Processor received input but does not accept any")]
    UnexpectedInput,
    /// `process` or `complete` was called before `init`
    #[error("Processor was driven before being initialized")]
    NotInitialized,
    /// Options could not be decoded
    #[error(transparent)]
    Options(#[from] OptionsError),
}

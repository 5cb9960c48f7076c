//! Materializing a side input view.
//!
//! The [ViewAccumulator] collects every windowed value of a dataset, groups the
//! values by window and, once its input is exhausted, emits one record per
//! window holding all values of that window. It must see the complete dataset,
//! so it runs as a single instance in the whole cluster.
use std::{marker::PhantomData, vec};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    metrics::{MetricName, MetricsContainer, MetricsReporter},
    processor::{
        force_total_parallelism_one, Emitter, ForceTotalParallelismOne, Outbox, Processor,
        ProcessorContext, ProcessorError, ProcessorSupplier,
    },
    traverser::{traverse_iter, IterTraverser},
    types::{BoundedWindow, Data, Instant, PaneInfo, WindowedValue},
};

mod combine;

pub use combine::{TimestampCombinePolicy, TimestampCombiner};

/// Combined timestamp and all values of one window
#[derive(Debug)]
struct WindowGroup<V> {
    timestamp: Instant,
    values: Vec<V>,
}

/// Groups windowed values by window.
///
/// Every input value must carry [PaneInfo::NO_FIRING]; windowing upstream
/// is expected to fire exactly once per window. Anything else is reported as
/// [ProcessorError::PaneMismatch].
///
/// On completion one `WindowedValue<Vec<V>>` is emitted per window which
/// received at least one value. Its timestamp is the combination of all value
/// timestamps under the [TimestampCombinePolicy], its window set contains only
/// that window and its values are in arrival order.
pub struct ViewAccumulator<V, C> {
    view_id: String,
    combiner: C,
    groups: IndexMap<BoundedWindow, WindowGroup<V>>,
    // prepared on the first call to complete
    result: Option<IterTraverser<vec::IntoIter<WindowedValue<Vec<V>>>>>,
    emitter: Emitter<WindowedValue<Vec<V>>>,
    metrics: MetricsContainer,
    reporter: Option<MetricsReporter>,
}

impl<V, C> ViewAccumulator<V, C>
where
    V: Data,
    C: TimestampCombinePolicy,
{
    /// Create an accumulator for the view `view_id`
    pub fn new(view_id: impl Into<String>, combiner: C) -> Self {
        let view_id = view_id.into();
        Self {
            metrics: MetricsContainer::new(view_id.clone()),
            view_id,
            combiner,
            groups: IndexMap::new(),
            result: None,
            emitter: Emitter::default(),
            reporter: None,
        }
    }

    /// Meta supplier running exactly one accumulator cluster wide
    pub fn supplier(
        view_id: impl Into<String>,
        combiner: C,
    ) -> ForceTotalParallelismOne<ViewSupplier<V, C>> {
        let view_id = view_id.into();
        force_total_parallelism_one(
            ViewSupplier {
                view_id: view_id.clone(),
                combiner,
                _values: PhantomData,
            },
            view_id,
        )
    }

    /// Count of windows holding at least one value
    pub fn window_count(&self) -> usize {
        self.groups.len()
    }

    fn snapshot(&mut self) -> Vec<WindowedValue<Vec<V>>> {
        let groups = std::mem::take(&mut self.groups);
        debug!(view = %self.view_id, windows = groups.len(), "Materializing view");
        let window_size = self.metrics.distribution(MetricName::shardflow("window-size"));
        groups
            .into_iter()
            .map(|(window, group)| {
                window_size.update(group.values.len() as i64);
                WindowedValue::of(group.values, group.timestamp, [window], PaneInfo::NO_FIRING)
            })
            .collect()
    }
}

impl<V, C> Processor for ViewAccumulator<V, C>
where
    V: Data,
    C: TimestampCombinePolicy,
{
    type Input = WindowedValue<V>;
    type Output = WindowedValue<Vec<V>>;

    fn init(&mut self, ctx: &ProcessorContext) -> Result<(), ProcessorError> {
        self.reporter = ctx.metrics_reporter();
        Ok(())
    }

    fn process(&mut self, _ordinal: usize, item: Self::Input) -> Result<(), ProcessorError> {
        if *item.pane() != PaneInfo::NO_FIRING {
            return Err(ProcessorError::PaneMismatch { found: *item.pane() });
        }
        if self.result.is_some() {
            return Err(ProcessorError::UnexpectedInput);
        }
        let timestamp = item.timestamp();
        for window in item.windows() {
            match self.groups.get_mut(window) {
                Some(group) => {
                    group.timestamp = self.combiner.combine(group.timestamp, timestamp);
                    group.values.push(item.value().clone());
                }
                None => {
                    self.groups.insert(
                        *window,
                        WindowGroup {
                            timestamp,
                            values: vec![item.value().clone()],
                        },
                    );
                }
            }
        }
        self.metrics
            .counter(MetricName::shardflow("elements-accumulated"))
            .inc();
        Ok(())
    }

    fn complete(&mut self, outbox: &mut Outbox<Self::Output>) -> Result<bool, ProcessorError> {
        if self.result.is_none() {
            self.result = Some(traverse_iter(self.snapshot()));
            if let Some(reporter) = self.reporter.as_ref() {
                reporter.report(&self.metrics);
            }
        }
        match self.result.as_mut() {
            Some(result) => self
                .emitter
                .emit_from_traverser(result, outbox)
                .or_else(|e| match e {}),
            None => Ok(true),
        }
    }

    fn close(&mut self) -> Result<(), ProcessorError> {
        if let Some(reporter) = self.reporter.take() {
            reporter.report(&self.metrics);
        }
        Ok(())
    }
}

/// Creates [ViewAccumulator]s on a member
pub struct ViewSupplier<V, C> {
    view_id: String,
    combiner: C,
    _values: PhantomData<fn() -> V>,
}

impl<V, C: Clone> Clone for ViewSupplier<V, C> {
    fn clone(&self) -> Self {
        Self {
            view_id: self.view_id.clone(),
            combiner: self.combiner.clone(),
            _values: PhantomData,
        }
    }
}

impl<V, C> ProcessorSupplier for ViewSupplier<V, C>
where
    V: Data,
    C: TimestampCombinePolicy,
{
    type Processor = ViewAccumulator<V, C>;

    fn get(&mut self, count: usize) -> Vec<Self::Processor> {
        (0..count)
            .map(|_| ViewAccumulator::new(self.view_id.clone(), self.combiner.clone()))
            .collect()
    }
}

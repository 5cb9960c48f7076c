//! Running jobs inside the local process.
//!
//! The [LocalRunner] simulates a cluster: the control plane runs synchronously
//! on the calling thread, every member then drives its processors on its own
//! thread. This executes a bounded read, optionally materialized into a view,
//! and hands back a [PipelineResult] together with the collected output.
use std::sync::Arc;

use bon::Builder;
use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, info, span, Level};

use crate::{
    config::{JobOptions, OptionsError, SerializableOptions},
    job::{FailedJobHandle, JobRunHandle, PipelineResult},
    metrics::MetricsAccumulator,
    processor::{
        MemberAddress, MetaSupplierContext, Outbox, Processor, ProcessorContext, ProcessorError,
        ProcessorMetaSupplier, ProcessorSupplier, SingletonError, SingletonProcessor,
        SupplierContext,
    },
    sources::{BoundedSource, PartitionError, SourcePartitioner},
    types::WindowedValue,
    view::{TimestampCombinePolicy, ViewAccumulator},
};

mod collector;
mod job;

pub use collector::OutputCollector;
pub use job::LocalJob;
use job::Control;

/// Executes jobs on threads of the current process, one thread per simulated
/// member.
///
/// # Example
/// ```rust
/// use shardflow::config::JobOptions;
/// use shardflow::job::RunState;
/// use shardflow::runtime::LocalRunner;
/// use shardflow::sources::VecSource;
///
/// let runner = LocalRunner::builder()
///     .options(JobOptions::builder().local_parallelism(2).build())
///     .build();
/// let submission = runner.read_bounded("numbers", VecSource::from_values(0..10));
/// assert_eq!(submission.result.wait_until_finish(None), RunState::Done);
/// assert_eq!(submission.output.len(), 10);
/// ```
#[derive(Debug, Builder)]
pub struct LocalRunner {
    /// Addresses of the simulated members
    #[builder(default = vec![MemberAddress::from(([127, 0, 0, 1], 5701))])]
    members: Vec<MemberAddress>,
    /// Options of every job started by this runner
    #[builder(default)]
    options: JobOptions,
}

/// A started job and the output it produces
pub struct Submission<T> {
    /// Handle to the running job
    pub result: Box<dyn PipelineResult>,
    /// Receives the output of the job while it runs
    pub output: OutputCollector<T>,
}

/// A processor ready to run together with its place in the cluster
struct Planned<P> {
    processor: P,
    ctx: ProcessorContext,
}

/// Processors of one vertex, per member
type Plan<P> = Vec<Vec<Planned<P>>>;

impl LocalRunner {
    /// Read `source` in parallel on all members, collecting every record
    pub fn read_bounded<S>(
        &self,
        name: impl Into<String>,
        source: S,
    ) -> Submission<WindowedValue<S::Output>>
    where
        S: BoundedSource,
    {
        let name = name.into();
        let output = OutputCollector::new();
        let accumulator = MetricsAccumulator::default();

        let planned = self.serialized_options().and_then(|options| {
            let partitioner = SourcePartitioner::new(source, options.clone(), name.clone());
            self.plan_vertex(&name, partitioner, &options, &accumulator)
        });
        let result = match planned {
            Ok(plan) => {
                let sink = output.clone();
                let capacity = self.outbox_capacity();
                let job = LocalJob::spawn(self.options.job_name().to_string(), move |control| {
                    drive_members(plan, capacity, control, &|item| {
                        sink.give(item);
                        Ok(())
                    })
                });
                bind(job, &accumulator)
            }
            Err(e) => failed(e),
        };
        Submission { result, output }
    }

    /// Read `source` in parallel on all members and materialize all records
    /// into the view `view_id`, collecting one record per window
    pub fn read_into_view<S, C>(
        &self,
        name: impl Into<String>,
        source: S,
        view_id: impl Into<String>,
        combiner: C,
    ) -> Submission<WindowedValue<Vec<S::Output>>>
    where
        S: BoundedSource,
        C: TimestampCombinePolicy,
    {
        let name = name.into();
        let view_id = view_id.into();
        let output = OutputCollector::new();
        let accumulator = MetricsAccumulator::default();

        let planned = self.serialized_options().and_then(|options| {
            let partitioner = SourcePartitioner::new(source, options.clone(), name.clone());
            let read = self.plan_vertex(&name, partitioner, &options, &accumulator)?;
            let view = self.plan_vertex(
                &view_id,
                ViewAccumulator::supplier(view_id.clone(), combiner),
                &options,
                &accumulator,
            )?;
            Ok((read, view))
        });
        let result = match planned {
            Ok((read, view)) => {
                let sink = output.clone();
                let capacity = self.outbox_capacity();
                let job = LocalJob::spawn(self.options.job_name().to_string(), move |control| {
                    let (tx, rx) = flume::bounded(capacity);
                    std::thread::scope(|scope| {
                        let view_thread = scope.spawn(|| {
                            drive_singleton(view, rx, capacity, control, &|item| {
                                sink.give(item);
                                Ok(())
                            })
                        });
                        let forward = move |item: WindowedValue<S::Output>| {
                            tx.send(item).map_err(|_| RunnerError::Aborted)
                        };
                        let read_result = drive_members(read, capacity, control, &forward);
                        // disconnects the view's input
                        drop(forward);
                        let view_result = view_thread.join().unwrap_or(Err(RunnerError::Panicked));
                        first_error([read_result, view_result])
                    })
                });
                bind(job, &accumulator)
            }
            Err(e) => failed(e),
        };
        Submission { result, output }
    }

    fn serialized_options(&self) -> Result<SerializableOptions, RunnerError> {
        if self.members.is_empty() {
            return Err(RunnerError::NoMembers);
        }
        Ok(SerializableOptions::new(&self.options)?)
    }

    fn outbox_capacity(&self) -> usize {
        self.options.outbox_capacity().max(1)
    }

    /// Run the control plane of a vertex, creating all its processors
    fn plan_vertex<M>(
        &self,
        vertex_name: &str,
        mut meta: M,
        options: &SerializableOptions,
        accumulator: &MetricsAccumulator,
    ) -> Result<Plan<<M::Supplier as ProcessorSupplier>::Processor>, RunnerError>
    where
        M: ProcessorMetaSupplier,
        RunnerError: From<M::Error>,
    {
        let member_count = self.members.len();
        let local_parallelism = meta
            .preferred_local_parallelism()
            .unwrap_or(self.options.local_parallelism())
            .max(1);
        meta.init(&MetaSupplierContext {
            vertex_name: vertex_name.to_string(),
            member_count,
            local_parallelism,
            options: options.clone(),
        })?;
        debug!(vertex_name, member_count, local_parallelism, "Planning vertex");

        self.members
            .iter()
            .enumerate()
            .map(|(member_index, member)| -> Result<Vec<Planned<_>>, RunnerError> {
                let mut supplier = meta.get(&self.members, member)?;
                supplier.init(&SupplierContext {
                    vertex_name: vertex_name.to_string(),
                    member_index,
                    member_count,
                    local_parallelism,
                });
                let planned = supplier
                    .get(local_parallelism)
                    .into_iter()
                    .enumerate()
                    .map(|(local_index, processor)| Planned {
                        processor,
                        ctx: ProcessorContext {
                            vertex_name: vertex_name.to_string(),
                            member_index,
                            member_count,
                            local_parallelism,
                            local_index,
                            metrics: Some(accumulator.clone()),
                        },
                    })
                    .collect();
                Ok(planned)
            })
            .collect()
    }
}

fn bind(job: LocalJob, accumulator: &MetricsAccumulator) -> Box<dyn PipelineResult> {
    let handle = JobRunHandle::new(accumulator);
    handle.bind(Some(Arc::new(job)));
    Box::new(handle)
}

fn failed(error: RunnerError) -> Box<dyn PipelineResult> {
    info!(%error, "Job failed to start");
    Box::new(FailedJobHandle::new(error))
}

/// The first error which is not just the consequence of another failure
fn first_error(
    results: impl IntoIterator<Item = Result<(), RunnerError>>,
) -> Result<(), RunnerError> {
    let errors = results.into_iter().filter_map(Result::err).collect_vec();
    let mut errors = errors.into_iter();
    match errors.next() {
        None => Ok(()),
        Some(RunnerError::Aborted) => Err(errors
            .find(|e| !matches!(e, RunnerError::Aborted))
            .unwrap_or(RunnerError::Aborted)),
        Some(e) => Err(e),
    }
}

/// Drive the processors of every member on a thread of their own
fn drive_members<P, E>(
    plan: Plan<P>,
    capacity: usize,
    control: &Control,
    emit: &E,
) -> Result<(), RunnerError>
where
    P: Processor,
    E: Fn(P::Output) -> Result<(), RunnerError> + Sync,
{
    std::thread::scope(|scope| {
        let threads = plan
            .into_iter()
            .enumerate()
            .map(|(member_index, planned)| {
                scope.spawn(move || {
                    let _span = span!(Level::INFO, "member", member_index);
                    let _span_guard = _span.enter();
                    drive_member(planned, capacity, control, emit)
                })
            })
            .collect_vec();
        first_error(
            threads
                .into_iter()
                .map(|t| t.join().unwrap_or(Err(RunnerError::Panicked))),
        )
    })
}

/// Round robin over the processors of a member until all are complete
fn drive_member<P, E>(
    mut planned: Vec<Planned<P>>,
    capacity: usize,
    control: &Control,
    emit: &E,
) -> Result<(), RunnerError>
where
    P: Processor,
    E: Fn(P::Output) -> Result<(), RunnerError>,
{
    let result = init_all(&mut planned)
        .map_err(RunnerError::from)
        .and_then(|_| run_to_completion(&mut planned, capacity, control, emit));
    if result.is_err() {
        control.stop();
    }
    first_error([result, close_all(&mut planned)])
}

/// Complete all initialized processors, emitting their output
fn run_to_completion<P, E>(
    planned: &mut [Planned<P>],
    capacity: usize,
    control: &Control,
    emit: &E,
) -> Result<(), RunnerError>
where
    P: Processor,
    E: Fn(P::Output) -> Result<(), RunnerError>,
{
    let mut outbox = Outbox::new(capacity);
    let mut done = vec![false; planned.len()];
    while done.iter().any(|x| !x) {
        if control.is_stopped() {
            return Err(RunnerError::Aborted);
        }
        for (p, is_done) in planned.iter_mut().zip(done.iter_mut()) {
            if *is_done {
                continue;
            }
            *is_done = p.processor.complete(&mut outbox)?;
            for item in outbox.drain() {
                emit(item)?;
            }
        }
    }
    Ok(())
}

/// Feed all input into the active instance of a singleton vertex, then
/// complete it
fn drive_singleton<P, E>(
    plan: Plan<SingletonProcessor<P>>,
    input: flume::Receiver<P::Input>,
    capacity: usize,
    control: &Control,
    emit: &E,
) -> Result<(), RunnerError>
where
    P: Processor,
    E: Fn(P::Output) -> Result<(), RunnerError>,
{
    let _span = span!(Level::INFO, "singleton");
    let _span_guard = _span.enter();
    let mut planned = plan.into_iter().flatten().collect_vec();
    let result = accumulate_and_complete(&mut planned, input, capacity, control, emit);
    if result.is_err() {
        control.stop();
    }
    first_error([result, close_all(&mut planned)])
}

fn accumulate_and_complete<P, E>(
    planned: &mut [Planned<SingletonProcessor<P>>],
    input: flume::Receiver<P::Input>,
    capacity: usize,
    control: &Control,
    emit: &E,
) -> Result<(), RunnerError>
where
    P: Processor,
    E: Fn(P::Output) -> Result<(), RunnerError>,
{
    init_all(planned)?;
    let active = planned
        .iter_mut()
        .find(|p| p.processor.is_active())
        .ok_or(RunnerError::NoMembers)?;
    for item in input.iter() {
        active.processor.process(0, item)?;
    }
    if control.is_stopped() {
        return Err(RunnerError::Aborted);
    }
    run_to_completion(planned, capacity, control, emit)
}

fn init_all<P: Processor>(planned: &mut [Planned<P>]) -> Result<(), ProcessorError> {
    for p in planned.iter_mut() {
        p.processor.init(&p.ctx)?;
    }
    Ok(())
}

fn close_all<P: Processor>(planned: &mut [Planned<P>]) -> Result<(), RunnerError> {
    planned
        .iter_mut()
        .map(|p| p.processor.close())
        .fold(Ok(()), |acc, x| acc.and(x))
        .map_err(RunnerError::from)
}

/// Failures starting or executing a job on the [LocalRunner]
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The runner has no members to run on
    #[error("Cannot run a job without members")]
    NoMembers,
    /// Partitioning the source failed
    #[error(transparent)]
    Partition(#[from] PartitionError),
    /// Placing a singleton vertex failed
    #[error(transparent)]
    Singleton(#[from] SingletonError),
    /// Options could not be serialized
    #[error(transparent)]
    Options(#[from] OptionsError),
    /// A processor failed
    #[error(transparent)]
    Processor(#[from] ProcessorError),
    /// Execution was stopped by a cancellation or another failure
    #[error("Execution was stopped")]
    Aborted,
    /// A thread of the job panicked
    #[error("A thread of the job panicked")]
    Panicked,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use itertools::Itertools;

    use crate::{
        job::RunState,
        metrics::{MetricNameFilter, MetricResults, MetricsFilter},
        sources::VecSource,
        testing::{EndlessSource, FailingSource},
        types::{BoundedWindow, Instant},
        view::TimestampCombiner,
    };

    use super::*;

    fn runner(members: u16, local: usize) -> LocalRunner {
        LocalRunner::builder()
            .members(
                (0..members)
                    .map(|i| MemberAddress::from(([127, 0, 0, 1], 5701 + i)))
                    .collect(),
            )
            .options(
                JobOptions::builder()
                    .local_parallelism(local)
                    .outbox_capacity(4)
                    .build(),
            )
            .build()
    }

    /// Every record is read exactly once across all members and workers
    #[test]
    fn reads_every_record() {
        let submission = runner(2, 3).read_bounded("numbers", VecSource::from_values(0u64..100));
        assert_eq!(submission.result.wait_until_finish(None), RunState::Done);
        assert_eq!(submission.result.state(), RunState::Done);

        let values = submission
            .output
            .into_iter()
            .map(|x| x.into_value())
            .sorted()
            .collect_vec();
        assert_eq!(values, (0..100).collect_vec());

        let filter = MetricsFilter::builder()
            .step("numbers")
            .name(MetricNameFilter::named("shardflow", "elements-read"))
            .build();
        let counters = submission.result.metrics().query_metrics(&filter).counters;
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].value, 100);
    }

    #[test]
    fn empty_source() {
        let submission = runner(3, 2).read_bounded("empty", VecSource::<u8>::new([]));
        assert_eq!(submission.result.wait_until_finish(None), RunState::Done);
        assert!(submission.output.is_empty());
    }

    /// All records end up in one view record per window
    #[test]
    fn materializes_view() {
        let records = (0..40).map(|i| (i % 2, Instant::from(40 - i)));
        let submission = runner(2, 2).read_into_view(
            "parity",
            VecSource::new(records),
            "parity-view",
            TimestampCombiner::Earliest,
        );
        assert_eq!(submission.result.wait_until_finish(None), RunState::Done);

        let out = submission.output.take();
        assert_eq!(out.len(), 1);
        let record = &out[0];
        assert_eq!(record.windows().iter().collect_vec(), vec![&BoundedWindow::Global]);
        assert_eq!(record.timestamp(), Instant::from(1));
        assert_eq!(record.value().len(), 40);
        assert_eq!(record.value().iter().filter(|x| **x == 0).count(), 20);

        let metrics = submission
            .result
            .metrics()
            .query_metrics(&MetricsFilter::builder().step("parity-view").build());
        assert_eq!(metrics.counters[0].value, 40);
        assert_eq!(metrics.distributions[0].value.count, 1);
    }

    /// A source which can not be split never starts
    #[test]
    fn failed_to_start() {
        let submission = runner(1, 1).read_bounded("broken", FailingSource::split());
        assert_eq!(submission.result.state(), RunState::Done);
        assert_eq!(submission.result.wait_until_finish(None), RunState::Done);
        assert!(submission
            .result
            .metrics()
            .query_metrics(&MetricsFilter::default())
            .is_empty());
    }

    #[test]
    fn no_members() {
        let runner = LocalRunner::builder().members(Vec::new()).build();
        let submission = runner.read_bounded("x", VecSource::from_values([1]));
        assert_eq!(submission.result.state(), RunState::Done);
    }

    #[test]
    fn read_error_fails_job() {
        let submission = runner(1, 1).read_bounded("failing", FailingSource::read_after(3));
        assert_eq!(submission.result.wait_until_finish(None), RunState::Failed);
        assert_eq!(submission.result.state(), RunState::Failed);
    }

    #[test]
    fn read_error_fails_view_job() {
        let submission = runner(2, 1).read_into_view(
            "failing",
            FailingSource::read_after(3),
            "view",
            TimestampCombiner::Latest,
        );
        assert_eq!(submission.result.wait_until_finish(None), RunState::Failed);
        assert!(submission.output.is_empty());
    }

    #[test]
    fn cancel_running_job() {
        let submission = runner(2, 2).read_bounded("endless", EndlessSource);
        assert_eq!(
            submission
                .result
                .wait_until_finish(Some(Duration::from_millis(20))),
            RunState::Running
        );
        assert_eq!(submission.result.cancel().unwrap(), RunState::Stopped);
        assert_eq!(submission.result.wait_until_finish(None), RunState::Stopped);
        assert_eq!(submission.result.state(), RunState::Stopped);
    }

    #[test]
    fn first_error_skips_aborted() {
        let result = first_error([
            Ok(()),
            Err(RunnerError::Aborted),
            Err(RunnerError::NoMembers),
        ]);
        assert!(matches!(result, Err(RunnerError::NoMembers)));
        assert!(matches!(
            first_error([Err(RunnerError::Aborted)]),
            Err(RunnerError::Aborted)
        ));
        assert!(first_error([Ok(()), Ok(())]).is_ok());
    }
}

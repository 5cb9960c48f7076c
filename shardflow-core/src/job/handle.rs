use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use tracing::{debug, error, warn};

use crate::metrics::{JobMetricResults, MetricResults, MetricsAccumulator};

use super::{Job, JobError, JobStatus, JoinOutcome, PipelineResult, RunState};

/// Handle to a submitted job.
///
/// The bound job and the last known [RunState] live behind a single lock.
/// Once the handle has observed a terminal state it never reports
/// [RunState::Running] or [RunState::Unknown] again, though it may move on to
/// another terminal state, e.g. from `Stopped` to `Done`.
pub struct JobRunHandle {
    inner: Mutex<HandleState>,
    metrics: JobMetricResults,
    unmapped_statuses: AtomicU64,
}

struct HandleState {
    job: Option<Arc<dyn Job>>,
    state: RunState,
    // error seen while waiting for the job
    failure: Option<Arc<JobError>>,
}

impl JobRunHandle {
    /// Create a handle without a job. Metrics are read from `accumulator`.
    pub fn new(accumulator: &MetricsAccumulator) -> Self {
        Self {
            inner: Mutex::new(HandleState {
                job: None,
                state: RunState::Unknown,
                failure: None,
            }),
            metrics: JobMetricResults::listening_to(accumulator),
            unmapped_statuses: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind a job to this handle and refresh the state from its status.
    ///
    /// Binding `None` refreshes the state from the previously bound job, if
    /// any, and leaves the handle unbound.
    pub fn bind(&self, job: Option<Arc<dyn Job>>) {
        let mut guard = self.lock();
        let status = job.as_ref().or(guard.job.as_ref()).map(|x| x.status());
        if let Some(status) = status {
            guard.state = self.derive(guard.state, &status);
        }
        debug!(bound = job.is_some(), state = ?guard.state, "Binding job");
        guard.job = job;
    }

    /// Current state of the job
    pub fn state(&self) -> RunState {
        let mut guard = self.lock();
        if let Some(status) = guard.job.as_ref().map(|x| x.status()) {
            guard.state = self.derive(guard.state, &status);
        }
        guard.state
    }

    /// Cancel the bound job. The handle is unbound afterwards and reports
    /// [RunState::Stopped]. Without a bound job this does nothing.
    ///
    /// If the job refuses to cancel, the error is returned and the job stays
    /// bound.
    pub fn cancel(&self) -> Result<RunState, JobError> {
        let mut guard = self.lock();
        if let Some(job) = guard.job.as_ref() {
            job.cancel()?;
            guard.job = None;
            guard.state = RunState::Stopped;
        }
        Ok(guard.state)
    }

    /// Block until the bound job finished or `timeout` elapsed.
    ///
    /// The lock is not held while waiting, so [JobRunHandle::state] and
    /// [JobRunHandle::cancel] remain usable. An error while waiting on a job
    /// which is still bound sets the state to [RunState::Failed] and is kept
    /// as [JobRunHandle::failure_cause].
    pub fn wait_until_finish(&self, timeout: Option<Duration>) -> RunState {
        let Some(job) = self.lock().job.clone() else {
            return self.state();
        };
        let outcome = job.join(timeout);

        let mut guard = self.lock();
        let still_bound = guard.job.as_ref().is_some_and(|x| Arc::ptr_eq(x, &job));
        match outcome {
            Ok(outcome) => {
                if still_bound {
                    let status = job.status();
                    guard.state = self.derive(guard.state, &status);
                }
                if outcome == JoinOutcome::TimedOut {
                    debug!(?timeout, state = ?guard.state, "Timed out waiting for job");
                }
            }
            Err(e) => {
                if still_bound {
                    error!(error = %e, "Error waiting for job to finish");
                    guard.state = RunState::Failed;
                    guard.failure = Some(Arc::new(e));
                } else {
                    debug!(error = %e, "Job ended after the handle was unbound");
                }
            }
        }
        guard.state
    }

    /// The error which made the job fail while waiting for it, if any
    pub fn failure_cause(&self) -> Option<Arc<JobError>> {
        self.lock().failure.clone()
    }

    /// How often a job reported a status which has no [RunState] counterpart
    pub fn unmapped_status_count(&self) -> u64 {
        self.unmapped_statuses.load(Ordering::Relaxed)
    }

    /// Live metrics of the job
    pub fn metrics(&self) -> &JobMetricResults {
        &self.metrics
    }

    fn derive(&self, current: RunState, status: &JobStatus) -> RunState {
        let derived = match status.run_state() {
            Some(x) => x,
            None => {
                self.unmapped_statuses.fetch_add(1, Ordering::Relaxed);
                warn!(%status, "Unrecognized job status");
                RunState::Unknown
            }
        };
        if current.is_terminal() && !derived.is_terminal() {
            current
        } else {
            derived
        }
    }
}

impl PipelineResult for JobRunHandle {
    fn state(&self) -> RunState {
        JobRunHandle::state(self)
    }

    fn cancel(&self) -> Result<RunState, JobError> {
        JobRunHandle::cancel(self)
    }

    fn wait_until_finish(&self, timeout: Option<Duration>) -> RunState {
        JobRunHandle::wait_until_finish(self, timeout)
    }

    fn metrics(&self) -> &dyn MetricResults {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use crate::metrics::{MetricName, MetricsContainer, MetricsFilter, MetricsReporter};

    use super::*;

    /// A job whose status and join result are set by the test
    struct FakeJob {
        status: Mutex<JobStatus>,
        join: Box<dyn Fn() -> Result<JoinOutcome, JobError> + Send + Sync>,
        cancelled: AtomicBool,
        refuse_cancel: AtomicBool,
    }

    impl FakeJob {
        fn new(status: JobStatus) -> Arc<Self> {
            Self::joining(status, || Ok(JoinOutcome::Finished))
        }

        fn joining(
            status: JobStatus,
            join: impl Fn() -> Result<JoinOutcome, JobError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                status: Mutex::new(status),
                join: Box::new(join),
                cancelled: AtomicBool::new(false),
                refuse_cancel: AtomicBool::new(false),
            })
        }

        fn set_status(&self, status: JobStatus) {
            *self.status.lock().unwrap() = status;
        }
    }

    impl Job for FakeJob {
        fn status(&self) -> JobStatus {
            self.status.lock().unwrap().clone()
        }

        fn cancel(&self) -> Result<(), JobError> {
            if self.refuse_cancel.load(Ordering::SeqCst) {
                return Err(JobError::Lost);
            }
            self.cancelled.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn join(&self, _timeout: Option<Duration>) -> Result<JoinOutcome, JobError> {
            (self.join)()
        }
    }

    fn handle() -> JobRunHandle {
        JobRunHandle::new(&MetricsAccumulator::default())
    }

    #[test]
    fn unbound_is_unknown() {
        let handle = handle();
        assert_eq!(handle.state(), RunState::Unknown);
        assert_eq!(handle.cancel().unwrap(), RunState::Unknown);
        assert_eq!(handle.wait_until_finish(None), RunState::Unknown);
    }

    #[test]
    fn state_follows_job() {
        let handle = handle();
        let job = FakeJob::new(JobStatus::Starting);
        handle.bind(Some(job.clone()));
        assert_eq!(handle.state(), RunState::Running);
        job.set_status(JobStatus::Running);
        assert_eq!(handle.state(), RunState::Running);
        job.set_status(JobStatus::Completed);
        assert_eq!(handle.state(), RunState::Done);
    }

    /// Binding nothing reads the status of the previous job, then unbinds
    #[test]
    fn bind_none_reads_previous_job() {
        let handle = handle();
        let job = FakeJob::new(JobStatus::Running);
        handle.bind(Some(job.clone()));
        job.set_status(JobStatus::Failed);
        handle.bind(None);
        assert_eq!(handle.state(), RunState::Failed);
        // unbound now, cancel is a no-op
        assert_eq!(handle.cancel().unwrap(), RunState::Failed);
        assert!(!job.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_stops_and_unbinds() {
        let handle = handle();
        let job = FakeJob::new(JobStatus::Running);
        handle.bind(Some(job.clone()));
        assert_eq!(handle.cancel().unwrap(), RunState::Stopped);
        assert!(job.cancelled.load(Ordering::SeqCst));
        job.set_status(JobStatus::Running);
        assert_eq!(handle.state(), RunState::Stopped);
        assert_eq!(handle.cancel().unwrap(), RunState::Stopped);
    }

    /// A refused cancel keeps the job bound, so the handle still follows it
    #[test]
    fn refused_cancel_keeps_job_bound() {
        let handle = handle();
        let job = FakeJob::new(JobStatus::Running);
        job.refuse_cancel.store(true, Ordering::SeqCst);
        handle.bind(Some(job.clone()));
        assert!(matches!(handle.cancel(), Err(JobError::Lost)));
        assert_eq!(handle.state(), RunState::Running);

        job.refuse_cancel.store(false, Ordering::SeqCst);
        assert_eq!(handle.cancel().unwrap(), RunState::Stopped);
        assert!(job.cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn refused_cancel_then_completion() {
        let handle = handle();
        let job = FakeJob::new(JobStatus::Running);
        job.refuse_cancel.store(true, Ordering::SeqCst);
        handle.bind(Some(job.clone()));
        assert!(handle.cancel().is_err());
        job.set_status(JobStatus::Completed);
        assert_eq!(handle.state(), RunState::Done);
        assert_eq!(handle.wait_until_finish(None), RunState::Done);
    }

    /// A job which has not started yet reports `Stopped` but may still finish
    #[test]
    fn not_running_job_can_complete() {
        let handle = handle();
        let job = FakeJob::new(JobStatus::NotRunning);
        handle.bind(Some(job.clone()));
        assert_eq!(handle.state(), RunState::Stopped);
        job.set_status(JobStatus::Completed);
        assert_eq!(handle.state(), RunState::Done);
        assert_eq!(handle.wait_until_finish(None), RunState::Done);
    }

    /// Terminal states may change into each other but never back to running
    #[test]
    fn terminal_state_never_runs_again() {
        let handle = handle();
        let job = FakeJob::new(JobStatus::Failed);
        handle.bind(Some(job.clone()));
        assert_eq!(handle.state(), RunState::Failed);
        job.set_status(JobStatus::Running);
        assert_eq!(handle.state(), RunState::Failed);
        job.set_status(JobStatus::Other("RESTARTING".into()));
        assert_eq!(handle.state(), RunState::Failed);
        job.set_status(JobStatus::Completed);
        assert_eq!(handle.state(), RunState::Done);
    }

    /// Cancelling while another thread waits does not record a failure
    #[test]
    fn cancel_during_wait_is_not_a_failure() {
        let handle = Arc::new(handle());
        let (entered_tx, entered_rx) = flume::bounded::<()>(1);
        let (release_tx, release_rx) = flume::bounded::<()>(0);
        let job = FakeJob::joining(JobStatus::Running, move || {
            let _ = entered_tx.send(());
            let _ = release_rx.recv();
            Err(JobError::Cancelled)
        });
        handle.bind(Some(job.clone()));

        let waiter = {
            let handle = Arc::clone(&handle);
            std::thread::spawn(move || handle.wait_until_finish(None))
        };
        // the waiter is blocked in join and not holding the lock
        entered_rx.recv().unwrap();
        assert_eq!(handle.cancel().unwrap(), RunState::Stopped);
        drop(release_tx);

        assert_eq!(waiter.join().unwrap(), RunState::Stopped);
        assert!(handle.failure_cause().is_none());
        assert_eq!(handle.state(), RunState::Stopped);
    }

    #[test]
    fn unrecognized_status() {
        let handle = handle();
        let job = FakeJob::new(JobStatus::Other("RESTARTING".into()));
        handle.bind(Some(job.clone()));
        assert_eq!(handle.state(), RunState::Unknown);
        assert_eq!(handle.unmapped_status_count(), 2);
    }

    #[test]
    fn wait_until_done() {
        let handle = handle();
        let job = FakeJob::new(JobStatus::Completed);
        handle.bind(Some(job));
        assert_eq!(handle.wait_until_finish(None), RunState::Done);
        assert!(handle.failure_cause().is_none());
    }

    /// A failing wait marks the job as failed and keeps the error
    #[test]
    fn wait_error_fails_job() {
        let handle = handle();
        let job = FakeJob::joining(JobStatus::Running, || {
            Err(JobError::Failed("boom".into()))
        });
        handle.bind(Some(job.clone()));
        assert_eq!(handle.wait_until_finish(None), RunState::Failed);
        assert!(matches!(
            handle.failure_cause().as_deref(),
            Some(JobError::Failed(msg)) if msg == "boom"
        ));
        // the job still claims to run, but the handle stays failed
        assert_eq!(handle.state(), RunState::Failed);
    }

    #[test]
    fn wait_timeout_is_not_failure() {
        let handle = handle();
        let job = FakeJob::joining(JobStatus::Running, || Ok(JoinOutcome::TimedOut));
        handle.bind(Some(job));
        assert_eq!(
            handle.wait_until_finish(Some(Duration::from_millis(1))),
            RunState::Running
        );
        assert!(handle.failure_cause().is_none());
    }

    #[test]
    fn metrics_are_live() {
        let accumulator = MetricsAccumulator::default();
        let handle = JobRunHandle::new(&accumulator);
        let filter = MetricsFilter::default();
        assert!(handle.metrics().query_metrics(&filter).is_empty());

        let mut container = MetricsContainer::new("read");
        container.counter(MetricName::shardflow("elements-read")).inc_by(4);
        MetricsReporter::new(accumulator, "read#0".into()).report(&container);
        assert_eq!(handle.metrics().query_metrics(&filter).counters[0].value, 4);
    }
}

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use flume::RecvTimeoutError;
use tracing::{error, info, span, Level};

use crate::job::{Job, JobError, JobStatus, JoinOutcome};

use super::RunnerError;

/// Stop signals shared by all threads of a [LocalJob]
#[derive(Debug, Default)]
pub(crate) struct Control {
    stopped: AtomicBool,
    cancelled: AtomicBool,
}

impl Control {
    /// Ask every thread of the job to stop at its next opportunity
    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.stop();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct Shared {
    status: Mutex<(JobStatus, Option<String>)>,
    control: Control,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, (JobStatus, Option<String>)> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A job executed on threads of the local process
#[derive(Debug)]
pub struct LocalJob {
    shared: Arc<Shared>,
    // never receives a message, disconnects once the job terminated
    done: flume::Receiver<()>,
}

impl LocalJob {
    /// Run `body` on a new thread. The job completes once `body` returns
    /// `Ok` and fails if it returns an error.
    pub(crate) fn spawn<F>(name: String, body: F) -> Self
    where
        F: FnOnce(&Control) -> Result<(), RunnerError> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            status: Mutex::new((JobStatus::Starting, None)),
            control: Control::default(),
        });
        let (done_tx, done_rx) = flume::bounded::<()>(0);
        let thread_shared = Arc::clone(&shared);

        std::thread::spawn(move || {
            let _span = span!(Level::INFO, "job", job_name = %name);
            let _span_guard = _span.enter();
            thread_shared.lock().0 = JobStatus::Running;
            info!("Starting execution");

            let result = body(&thread_shared.control);
            let mut guard = thread_shared.lock();
            match result {
                Ok(()) => {
                    info!("Finished execution");
                    *guard = (JobStatus::Completed, None);
                }
                Err(e) if thread_shared.control.is_cancelled() => {
                    info!(reason = %e, "Execution cancelled");
                    *guard = (JobStatus::Failed, Some(e.to_string()));
                }
                Err(e) => {
                    error!(error = %e, "Execution failed");
                    *guard = (JobStatus::Failed, Some(e.to_string()));
                }
            }
            drop(guard);
            drop(done_tx);
        });

        Self {
            shared,
            done: done_rx,
        }
    }

    fn outcome(&self) -> Result<JoinOutcome, JobError> {
        let guard = self.shared.lock();
        match &*guard {
            (JobStatus::Completed, _) => Ok(JoinOutcome::Finished),
            (JobStatus::Failed, _) if self.shared.control.is_cancelled() => {
                Err(JobError::Cancelled)
            }
            (JobStatus::Failed, reason) => {
                Err(JobError::Failed(reason.clone().unwrap_or_default()))
            }
            // the job thread died without reporting
            _ => Err(JobError::Lost),
        }
    }
}

impl Job for LocalJob {
    fn status(&self) -> JobStatus {
        self.shared.lock().0.clone()
    }

    fn cancel(&self) -> Result<(), JobError> {
        info!("Cancelling job");
        self.shared.control.cancel();
        Ok(())
    }

    fn join(&self, timeout: Option<Duration>) -> Result<JoinOutcome, JobError> {
        let received = match timeout {
            Some(t) => self.done.recv_timeout(t),
            None => self
                .done
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Err(RecvTimeoutError::Timeout) => Ok(JoinOutcome::TimedOut),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => self.outcome(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Body spinning until it is stopped
    fn until_stopped(control: &Control) -> Result<(), RunnerError> {
        while !control.is_stopped() {
            std::thread::sleep(Duration::from_millis(1));
        }
        Err(RunnerError::Aborted)
    }

    #[test]
    fn completes() {
        let job = LocalJob::spawn("ok".into(), |_| Ok(()));
        assert_eq!(job.join(None).unwrap(), JoinOutcome::Finished);
        assert_eq!(job.status(), JobStatus::Completed);
        // joining again gives the same result
        assert_eq!(job.join(None).unwrap(), JoinOutcome::Finished);
    }

    #[test]
    fn fails() {
        let job = LocalJob::spawn("fail".into(), |_| Err(RunnerError::NoMembers));
        let err = job.join(None).unwrap_err();
        assert!(matches!(err, JobError::Failed(_)));
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn timeout_then_cancel() {
        let job = LocalJob::spawn("endless".into(), until_stopped);
        assert_eq!(
            job.join(Some(Duration::from_millis(10))).unwrap(),
            JoinOutcome::TimedOut
        );
        assert_eq!(job.status(), JobStatus::Running);
        job.cancel().unwrap();
        assert!(matches!(job.join(None), Err(JobError::Cancelled)));
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn panicking_body_is_lost() {
        let job = LocalJob::spawn("panic".into(), |_| panic!("boom"));
        assert!(matches!(job.join(None), Err(JobError::Lost)));
    }
}

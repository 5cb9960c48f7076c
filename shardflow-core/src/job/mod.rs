//! Observing and controlling a submitted job.
//!
//! A [JobRunHandle] projects the [JobStatus] of a running [Job] onto a small
//! [RunState] and offers cancellation, waiting and live metrics. Jobs which
//! could not even be started are represented by a [FailedJobHandle]. Both
//! implement [PipelineResult].
use std::time::Duration;

use thiserror::Error;

use crate::metrics::MetricResults;

mod failed;
mod handle;
mod status;

pub use failed::FailedJobHandle;
pub use handle::JobRunHandle;
pub use status::{JobStatus, RunState};

/// A job running on an engine
pub trait Job: Send + Sync {
    /// Current status as reported by the engine
    fn status(&self) -> JobStatus;

    /// Request cancellation. Returns once the request was accepted, the job
    /// may still be running.
    fn cancel(&self) -> Result<(), JobError>;

    /// Block until the job terminated or `timeout` elapsed.
    /// `None` waits without limit.
    fn join(&self, timeout: Option<Duration>) -> Result<JoinOutcome, JobError>;
}

/// How [Job::join] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The job terminated successfully
    Finished,
    /// The timeout elapsed before the job terminated
    TimedOut,
}

/// Failures of a job or of interacting with it
#[derive(Debug, Error)]
pub enum JobError {
    /// The job terminated with an error
    #[error("Job failed: {0}")]
    Failed(String),
    /// The job was cancelled before it finished
    #[error("Job was cancelled")]
    Cancelled,
    /// The job stopped reporting without a result
    #[error("Lost connection to the job")]
    Lost,
}

/// What a caller gets back after submitting a job
pub trait PipelineResult: Send + Sync {
    /// Current state of the job
    fn state(&self) -> RunState;

    /// Cancel the job, returning the resulting state
    fn cancel(&self) -> Result<RunState, JobError>;

    /// Block until the job terminated or `timeout` elapsed and return the
    /// state at that point. Failures of the job do not surface as an error,
    /// the returned state is [RunState::Failed] instead.
    fn wait_until_finish(&self, timeout: Option<Duration>) -> RunState;

    /// Metrics of the job
    fn metrics(&self) -> &dyn MetricResults;
}

use std::{error::Error, time::Duration};

use crate::metrics::{EmptyMetricResults, MetricResults};

use super::{JobError, PipelineResult, RunState};

/// Result of a job which failed before it started running.
/// Such a job is considered done, without any progress and without metrics.
#[derive(Debug)]
pub struct FailedJobHandle {
    cause: Box<dyn Error + Send + Sync>,
}

impl FailedJobHandle {
    /// Create a handle for a job which failed to start because of `cause`
    pub fn new(cause: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self {
            cause: cause.into(),
        }
    }

    /// Why the job failed to start
    pub fn cause(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.cause.as_ref()
    }
}

impl PipelineResult for FailedJobHandle {
    fn state(&self) -> RunState {
        RunState::Done
    }

    fn cancel(&self) -> Result<RunState, JobError> {
        Ok(RunState::Done)
    }

    fn wait_until_finish(&self, _timeout: Option<Duration>) -> RunState {
        RunState::Done
    }

    fn metrics(&self) -> &dyn MetricResults {
        &EmptyMetricResults
    }
}

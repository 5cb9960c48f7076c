use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Status of a job as reported by the engine running it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Submitted but not yet scheduled
    NotRunning,
    /// Being initialized on the cluster
    Starting,
    /// Processors are executing
    Running,
    /// Suspended, may be resumed
    Suspended,
    /// All processors finished, final cleanup is in progress
    Completing,
    /// Terminated with an error or was cancelled
    Failed,
    /// Terminated successfully
    Completed,
    /// A status this crate does not know about
    Other(String),
}

impl JobStatus {
    /// The [RunState] this status corresponds to, `None` for [JobStatus::Other]
    pub fn run_state(&self) -> Option<RunState> {
        match self {
            JobStatus::Completed => Some(RunState::Done),
            JobStatus::Completing | JobStatus::Running | JobStatus::Starting => {
                Some(RunState::Running)
            }
            JobStatus::Failed => Some(RunState::Failed),
            JobStatus::NotRunning | JobStatus::Suspended => Some(RunState::Stopped),
            JobStatus::Other(_) => None,
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Other(x) => write!(f, "{x}"),
            x => write!(f, "{x:?}"),
        }
    }
}

/// State of a job as seen by the caller who submitted it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RunState {
    /// No job was bound yet or its status was not recognized
    #[default]
    Unknown,
    /// The job is starting or running
    Running,
    /// The job finished successfully
    Done,
    /// The job failed
    Failed,
    /// The job was cancelled or suspended
    Stopped,
}

impl RunState {
    /// True if the job can not change its state anymore
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed | RunState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let table = [
            (JobStatus::Completed, Some(RunState::Done)),
            (JobStatus::Completing, Some(RunState::Running)),
            (JobStatus::Running, Some(RunState::Running)),
            (JobStatus::Starting, Some(RunState::Running)),
            (JobStatus::Failed, Some(RunState::Failed)),
            (JobStatus::NotRunning, Some(RunState::Stopped)),
            (JobStatus::Suspended, Some(RunState::Stopped)),
            (JobStatus::Other("SUSPENDED_EXPORTING".into()), None),
        ];
        for (status, expected) in table {
            assert_eq!(status.run_state(), expected, "{status}");
        }
    }

    #[test]
    fn terminal_states() {
        assert!(!RunState::Unknown.is_terminal());
        assert!(!RunState::Running.is_terminal());
        assert!(RunState::Done.is_terminal());
        assert!(RunState::Failed.is_terminal());
        assert!(RunState::Stopped.is_terminal());
    }
}

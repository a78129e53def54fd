// Job lifecycle data models
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Dispatched,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Engine-level view: either nothing is running or exactly one job is
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EngineStatus {
    Idle,
    Busy { job_id: String, job_state: JobState },
}

/// Result of a cancel request
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// This call requested the cancellation
    Requested,
    /// A cancellation was already in flight
    AlreadyRequested,
    /// The job had already finished (or there is no active job)
    NotActive,
}

/// Final result of one worker invocation
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobOutcome {
    Completed { output: String },
    Failed { code: Option<i32>, message: String },
    Cancelled,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            JobOutcome::Completed { .. } => JobState::Completed,
            JobOutcome::Failed { .. } => JobState::Failed,
            JobOutcome::Cancelled => JobState::Cancelled,
        }
    }
}

/// Serializable snapshot of a job for the frontend
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub pid: Option<u32>,
    pub state: JobState,
    pub input: String,
    pub output: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error: Option<String>,
}

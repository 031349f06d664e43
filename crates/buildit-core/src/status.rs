//! Job statuses and the aggregation rules that derive stage and pipeline
//! statuses from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Status of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Declared, waiting for its stage to become eligible.
    Created,
    /// Queued for an execution backend.
    Pending,
    /// Reported as started by the backend.
    Running,
    Success,
    Failed,
    Canceled,
    /// Never ran because an earlier stage failed or was canceled.
    Skipped,
    /// Waiting for an explicit play action.
    Manual,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Created,
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Success,
        JobStatus::Failed,
        JobStatus::Canceled,
        JobStatus::Skipped,
        JobStatus::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
            JobStatus::Skipped => "skipped",
            JobStatus::Manual => "manual",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Canceled | JobStatus::Skipped
        )
    }

    /// Whether a job in this status can be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobStatus::Success | JobStatus::Failed | JobStatus::Canceled
        )
    }

    /// Whether a pipeline cancel moves a job in this status to `canceled`.
    pub fn is_cancelable(&self) -> bool {
        matches!(
            self,
            JobStatus::Created | JobStatus::Pending | JobStatus::Running
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown job status '{}'", s)))
    }
}

/// Derived status of a stage or a whole pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

impl CompositeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompositeStatus::Pending => "pending",
            CompositeStatus::Running => "running",
            CompositeStatus::Success => "success",
            CompositeStatus::Failed => "failed",
            CompositeStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CompositeStatus::Success | CompositeStatus::Failed | CompositeStatus::Canceled
        )
    }

    /// A terminal outcome that makes downstream stages skip their jobs.
    pub fn blocks_downstream(&self) -> bool {
        matches!(self, CompositeStatus::Failed | CompositeStatus::Canceled)
    }
}

impl fmt::Display for CompositeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fold the `(status, allow_failure)` pairs of a stage's active jobs into
/// the stage status.
///
/// Precedence, first match wins: running, then pending/created, then a
/// failure that is not allowed, then canceled, otherwise success. Idle
/// manual jobs never hold a stage back, and an empty stage is a success.
pub fn aggregate_jobs<I>(jobs: I) -> CompositeStatus
where
    I: IntoIterator<Item = (JobStatus, bool)>,
{
    let mut running = false;
    let mut pending = false;
    let mut failed = false;
    let mut canceled = false;

    for (status, allow_failure) in jobs {
        match status {
            JobStatus::Running => running = true,
            JobStatus::Created | JobStatus::Pending => pending = true,
            JobStatus::Failed if !allow_failure => failed = true,
            JobStatus::Canceled => canceled = true,
            JobStatus::Failed | JobStatus::Success | JobStatus::Skipped | JobStatus::Manual => {}
        }
    }

    if running {
        CompositeStatus::Running
    } else if pending {
        CompositeStatus::Pending
    } else if failed {
        CompositeStatus::Failed
    } else if canceled {
        CompositeStatus::Canceled
    } else {
        CompositeStatus::Success
    }
}

/// Fold stage statuses, in ordinal order, into the pipeline status.
///
/// Any running stage makes the pipeline running and any pending stage makes
/// it pending. Otherwise the last stage that did not succeed decides, since
/// later stages only run once earlier ones have settled.
pub fn aggregate_stages<I>(stages: I) -> CompositeStatus
where
    I: IntoIterator<Item = CompositeStatus>,
{
    let mut running = false;
    let mut pending = false;
    let mut outcome = CompositeStatus::Success;

    for status in stages {
        match status {
            CompositeStatus::Running => running = true,
            CompositeStatus::Pending => pending = true,
            CompositeStatus::Failed | CompositeStatus::Canceled => outcome = status,
            CompositeStatus::Success => {}
        }
    }

    if running {
        CompositeStatus::Running
    } else if pending {
        CompositeStatus::Pending
    } else {
        outcome
    }
}

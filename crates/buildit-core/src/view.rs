//! Read models handed to observers.
//!
//! A view is built from a pipeline in one go, so its stage and pipeline
//! statuses always agree with the job statuses it contains.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::pipeline::Pipeline;
use crate::stage::Stage;
use crate::status::{CompositeStatus, JobStatus};
use crate::{JobId, PipelineId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub name: String,
    pub stage: String,
    pub status: JobStatus,
    pub allow_failure: bool,
    pub manual: bool,
    /// Reported by an external system.
    pub generic: bool,
    pub target_url: Option<String>,
    pub retryable: bool,
    pub playable: bool,
    pub cancelable: bool,
    /// Superseded by a retry.
    pub retried: bool,
    pub retry_of: Option<JobId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageView {
    pub name: String,
    pub position: usize,
    pub status: CompositeStatus,
    pub jobs: Vec<JobView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineView {
    pub id: PipelineId,
    pub name: String,
    pub git_ref: String,
    pub sha: String,
    pub status: CompositeStatus,
    /// Some failed or canceled job can be retried.
    pub retryable: bool,
    /// Some job is still waiting or running.
    pub cancelable: bool,
    /// Every job instance, retried ones included.
    pub job_count: usize,
    pub stages: Vec<StageView>,
    /// Superseded jobs, oldest first.
    pub retried: Vec<JobView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            name: job.name.clone(),
            stage: job.stage.clone(),
            status: job.status(),
            allow_failure: job.allow_failure,
            manual: job.is_manual(),
            generic: job.is_generic(),
            target_url: job.target_url().map(str::to_string),
            retryable: job.is_retryable(),
            playable: job.is_playable(),
            cancelable: job.is_cancelable(),
            retried: !job.is_active(),
            retry_of: job.retry_of,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

impl From<&Stage> for StageView {
    fn from(stage: &Stage) -> Self {
        Self {
            name: stage.name().to_string(),
            position: stage.position(),
            status: stage.status(),
            jobs: stage.jobs().iter().map(JobView::from).collect(),
        }
    }
}

impl From<&Pipeline> for PipelineView {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id(),
            name: pipeline.name().to_string(),
            git_ref: pipeline.git_ref().to_string(),
            sha: pipeline.sha().to_string(),
            status: pipeline.status(),
            retryable: pipeline.is_retryable(),
            cancelable: pipeline.is_cancelable(),
            job_count: pipeline.jobs().count() + pipeline.history().len(),
            stages: pipeline.stages().iter().map(StageView::from).collect(),
            retried: pipeline.history().iter().map(JobView::from).collect(),
            created_at: pipeline.created_at(),
            updated_at: pipeline.updated_at(),
        }
    }
}

impl PipelineView {
    pub fn stage(&self, name: &str) -> Option<&StageView> {
        self.stages.iter().find(|stage| stage.name == name)
    }

    /// Any job instance by id, retried ones included.
    pub fn job(&self, id: JobId) -> Option<&JobView> {
        self.stages
            .iter()
            .flat_map(|stage| stage.jobs.iter())
            .chain(self.retried.iter())
            .find(|job| job.id == id)
    }

    /// The active job in a stage/name slot.
    pub fn active_job(&self, stage: &str, name: &str) -> Option<&JobView> {
        self.stage(stage)?.jobs.iter().find(|job| job.name == name)
    }
}

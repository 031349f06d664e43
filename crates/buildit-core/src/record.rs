//! Persisted shape of a pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::status::JobStatus;
use crate::{Error, PipelineId, Result};

/// Everything needed to rebuild a [`crate::Pipeline`]. Derived statuses are
/// not stored; they are recomputed on restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: PipelineId,
    pub name: String,
    pub git_ref: String,
    pub sha: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Stages in ordinal order.
    pub stages: Vec<StageRecord>,
    /// Jobs superseded by a retry, oldest first.
    #[serde(default)]
    pub history: Vec<Job>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub jobs: Vec<Job>,
}

impl PipelineRecord {
    /// A record with no stages, stamped now.
    pub fn new(name: impl Into<String>, git_ref: impl Into<String>, sha: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PipelineId::new(),
            name: name.into(),
            git_ref: git_ref.into(),
            sha: sha.into(),
            created_at: now,
            updated_at: now,
            stages: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Append a stage holding `jobs`.
    pub fn stage(mut self, name: impl Into<String>, jobs: Vec<Job>) -> Self {
        self.stages.push(StageRecord {
            name: name.into(),
            jobs,
        });
        self
    }

    /// Overwrite the stored status of job `job` in stage `stage`. The record
    /// is not checked here; [`crate::Pipeline::restore`] rejects impossible
    /// combinations.
    pub fn with_job_status(mut self, stage: &str, job: &str, status: JobStatus) -> Result<Self> {
        let target = self
            .stages
            .iter_mut()
            .filter(|record| record.name == stage)
            .flat_map(|record| record.jobs.iter_mut())
            .find(|candidate| candidate.name == job)
            .ok_or_else(|| Error::NotFound(format!("job '{}' in stage '{}'", job, stage)))?;
        *target = target.clone().with_status(status);
        Ok(self)
    }
}

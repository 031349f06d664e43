//! Stages group the active jobs of one pipeline step.

use crate::job::Job;
use crate::status::{CompositeStatus, aggregate_jobs};
use crate::{Error, JobId, Result};

/// A named, ordered group of active jobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    name: String,
    position: usize,
    jobs: Vec<Job>,
    status: CompositeStatus,
}

impl Stage {
    pub(crate) fn new(name: impl Into<String>, position: usize) -> Self {
        Self {
            name: name.into(),
            position,
            jobs: Vec::new(),
            status: CompositeStatus::Success,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordinal within the pipeline, starting at 0.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Active jobs in declaration order.
    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// Cached status, refreshed by the owning pipeline after every change.
    pub fn status(&self) -> CompositeStatus {
        self.status
    }

    /// Status computed from scratch from the current jobs.
    pub fn compute_status(&self) -> CompositeStatus {
        aggregate_jobs(
            self.jobs
                .iter()
                .map(|job| (job.status(), job.allow_failure)),
        )
    }

    pub(crate) fn refresh(&mut self) {
        self.status = self.compute_status();
    }

    pub(crate) fn jobs_mut(&mut self) -> &mut [Job] {
        &mut self.jobs
    }

    pub(crate) fn position_of(&self, id: JobId) -> Option<usize> {
        self.jobs.iter().position(|job| job.id == id)
    }

    /// Add a job at the end, taking ownership of its placement.
    pub(crate) fn push(&mut self, mut job: Job) -> Result<()> {
        if self.job(&job.name).is_some() {
            return Err(Error::InvalidInput(format!(
                "duplicate job '{}' in stage '{}'",
                job.name, self.name
            )));
        }
        if !job.is_active() {
            return Err(Error::Internal(format!(
                "superseded job '{}' cannot be active in stage '{}'",
                job.name, self.name
            )));
        }
        job.stage = self.name.clone();
        job.stage_idx = self.position;
        self.jobs.push(job);
        Ok(())
    }

    /// Swap the job at `index` for its retry successor, returning the old one.
    pub(crate) fn replace(&mut self, index: usize, successor: Job) -> Job {
        std::mem::replace(&mut self.jobs[index], successor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::When;
    use crate::status::JobStatus;

    #[test]
    fn test_push_places_job() {
        let mut stage = Stage::new("test", 1);
        stage.push(Job::build("unit", When::OnSuccess)).unwrap();
        let job = stage.job("unit").unwrap();
        assert_eq!(job.stage, "test");
        assert_eq!(job.stage_idx, 1);
    }

    #[test]
    fn test_push_rejects_duplicate_name() {
        let mut stage = Stage::new("test", 0);
        stage.push(Job::build("unit", When::OnSuccess)).unwrap();
        assert!(matches!(
            stage.push(Job::build("unit", When::Manual)),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_refresh_tracks_jobs() {
        let mut stage = Stage::new("deploy", 0);
        stage
            .push(Job::build("deploy", When::OnSuccess).with_status(JobStatus::Running))
            .unwrap();
        stage
            .push(Job::build("manual-build", When::Manual).with_status(JobStatus::Manual))
            .unwrap();
        stage.refresh();
        assert_eq!(stage.status(), CompositeStatus::Running);

        stage.jobs_mut()[0].cancel().unwrap();
        assert_eq!(stage.compute_status(), CompositeStatus::Canceled);
        assert_eq!(stage.status(), CompositeStatus::Running);
        stage.refresh();
        assert_eq!(stage.status(), CompositeStatus::Canceled);
    }
}

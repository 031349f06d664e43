//! Pipelines: ordered stages, stage gating and the user-facing actions.
//!
//! Every mutating method applies its change, runs gating ([`Pipeline::process`])
//! and refreshes the cached stage and pipeline statuses before returning, so
//! the aggregates never lag behind the jobs.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::definition::{JobDefinitionKind, PipelineDefinition};
use crate::job::{Job, Transition, is_generic_status};
use crate::record::{PipelineRecord, StageRecord};
use crate::stage::Stage;
use crate::status::{CompositeStatus, JobStatus, aggregate_stages};
use crate::view::PipelineView;
use crate::{Error, JobId, PipelineId, Result};

/// One CI run for a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    id: PipelineId,
    name: String,
    git_ref: String,
    sha: String,
    stages: Vec<Stage>,
    history: Vec<Job>,
    status: CompositeStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Pipeline {
    /// Instantiate a definition. All jobs start in `created`, external jobs
    /// in their declared status, and the first eligible stages are queued.
    pub fn create(
        definition: &PipelineDefinition,
        git_ref: impl Into<String>,
        sha: impl Into<String>,
    ) -> Result<Self> {
        if definition.name.trim().is_empty() {
            return Err(Error::InvalidInput("pipeline name is empty".to_string()));
        }

        let mut record = PipelineRecord::new(definition.name.clone(), git_ref, sha);
        for stage in &definition.stages {
            let mut jobs = Vec::with_capacity(stage.jobs.len());
            for decl in &stage.jobs {
                let job = match &decl.kind {
                    JobDefinitionKind::Build { when } => Job::build(decl.name.clone(), *when),
                    JobDefinitionKind::External { target_url, status } => {
                        Job::generic(decl.name.clone(), target_url.clone(), *status)?
                    }
                };
                jobs.push(job.with_allow_failure(decl.allow_failure));
            }
            record.stages.push(StageRecord {
                name: stage.name.clone(),
                jobs,
            });
        }

        let mut pipeline = Self::assemble(record).map_err(|e| match e {
            Error::Internal(msg) => Error::InvalidInput(msg),
            other => other,
        })?;
        pipeline.process();
        pipeline.refresh();
        Ok(pipeline)
    }

    /// Rebuild a pipeline from a stored record.
    ///
    /// Statuses are taken as stored; no job is transitioned. Records that
    /// violate a pipeline invariant are rejected with [`Error::Internal`].
    pub fn restore(record: PipelineRecord) -> Result<Self> {
        let mut pipeline = Self::assemble(record)?;
        pipeline.refresh();
        Ok(pipeline)
    }

    fn assemble(record: PipelineRecord) -> Result<Self> {
        let mut names = HashSet::new();
        let mut stages = Vec::with_capacity(record.stages.len());
        for (position, stage_record) in record.stages.into_iter().enumerate() {
            if stage_record.name.trim().is_empty() {
                return Err(Error::Internal(format!("stage {} has no name", position)));
            }
            if !names.insert(stage_record.name.clone()) {
                return Err(Error::Internal(format!(
                    "duplicate stage '{}'",
                    stage_record.name
                )));
            }
            let mut stage = Stage::new(stage_record.name, position);
            for job in stage_record.jobs {
                check_generic(&job)?;
                stage.push(job).map_err(|e| Error::Internal(e.to_string()))?;
            }
            stages.push(stage);
        }

        let mut ids = HashSet::new();
        for job in stages.iter().flat_map(|stage| stage.jobs()) {
            if !ids.insert(job.id) {
                return Err(Error::Internal(format!("duplicate job id {}", job.id)));
            }
        }
        for job in &record.history {
            if !ids.insert(job.id) {
                return Err(Error::Internal(format!("duplicate job id {}", job.id)));
            }
        }
        for job in &record.history {
            check_generic(job)?;
            match job.superseded_by() {
                Some(successor) if ids.contains(&successor) => {}
                Some(successor) => {
                    return Err(Error::Internal(format!(
                        "retried job '{}' points at unknown successor {}",
                        job.name, successor
                    )));
                }
                None => {
                    return Err(Error::Internal(format!(
                        "job '{}' in history was never retried",
                        job.name
                    )));
                }
            }
            if !stages.iter().any(|stage| stage.name() == job.stage) {
                return Err(Error::Internal(format!(
                    "retried job '{}' belongs to unknown stage '{}'",
                    job.name, job.stage
                )));
            }
        }

        Ok(Self {
            id: record.id,
            name: record.name,
            git_ref: record.git_ref,
            sha: record.sha,
            stages,
            history: record.history,
            status: CompositeStatus::Success,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    pub fn to_record(&self) -> PipelineRecord {
        PipelineRecord {
            id: self.id,
            name: self.name.clone(),
            git_ref: self.git_ref.clone(),
            sha: self.sha.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            stages: self
                .stages
                .iter()
                .map(|stage| StageRecord {
                    name: stage.name().to_string(),
                    jobs: stage.jobs().to_vec(),
                })
                .collect(),
            history: self.history.clone(),
        }
    }

    pub fn view(&self) -> PipelineView {
        PipelineView::from(self)
    }

    pub fn id(&self) -> PipelineId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn git_ref(&self) -> &str {
        &self.git_ref
    }

    pub fn sha(&self) -> &str {
        &self.sha
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|stage| stage.name() == name)
    }

    /// Superseded jobs, oldest first.
    pub fn history(&self) -> &[Job] {
        &self.history
    }

    /// Active jobs across all stages, by stage then declaration order.
    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.stages.iter().flat_map(|stage| stage.jobs().iter())
    }

    /// Any job instance by id, retried ones included.
    pub fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs()
            .chain(self.history.iter())
            .find(|job| job.id == id)
    }

    /// The active job in a stage/name slot.
    pub fn active_job(&self, stage: &str, name: &str) -> Option<&Job> {
        self.stage(stage)?.job(name)
    }

    /// Every version of the job `id`, oldest first, ending with `id` itself.
    pub fn lineage(&self, id: JobId) -> Vec<&Job> {
        let mut chain = Vec::new();
        let mut next = self.job(id);
        while let Some(job) = next {
            chain.push(job);
            next = job.retry_of.and_then(|prev| self.job(prev));
        }
        chain.reverse();
        chain
    }

    /// Cached status, refreshed after every change.
    pub fn status(&self) -> CompositeStatus {
        self.status
    }

    /// Status computed from scratch from the current jobs.
    pub fn compute_status(&self) -> CompositeStatus {
        aggregate_stages(self.stages.iter().map(Stage::compute_status))
    }

    /// Whether every cached aggregate matches a recomputation from scratch.
    pub fn is_consistent(&self) -> bool {
        self.stages
            .iter()
            .all(|stage| stage.status() == stage.compute_status())
            && self.status == self.compute_status()
    }

    pub fn is_cancelable(&self) -> bool {
        self.jobs().any(Job::is_cancelable)
    }

    pub fn is_retryable(&self) -> bool {
        self.jobs().any(|job| {
            job.is_retryable()
                && matches!(job.status(), JobStatus::Failed | JobStatus::Canceled)
        })
    }

    fn refresh(&mut self) {
        for stage in &mut self.stages {
            stage.refresh();
        }
        self.status = aggregate_stages(self.stages.iter().map(Stage::status));
    }

    fn settle(&mut self, transitions: &mut Vec<Transition>) {
        transitions.extend(self.process());
        self.refresh();
        self.updated_at = Utc::now();
    }

    /// Move `created` jobs of eligible stages forward.
    ///
    /// A stage is eligible once every earlier stage has settled. If one of
    /// them failed or was canceled, the stage's jobs are skipped; otherwise
    /// they are queued, or parked in `manual`.
    pub fn process(&mut self) -> Vec<Transition> {
        let mut transitions = Vec::new();
        let mut blocked = false;

        for stage in &mut self.stages {
            for job in stage.jobs_mut() {
                if job.status() != JobStatus::Created {
                    continue;
                }
                let moved = if blocked { job.skip() } else { job.enqueue() };
                transitions.extend(moved.ok());
            }
            stage.refresh();
            let status = stage.status();
            if !status.is_terminal() {
                break;
            }
            blocked |= status.blocks_downstream();
        }

        transitions
    }

    /// Position of an active job. A retried job is a conflict, an unknown
    /// one is not found.
    fn locate(&self, id: JobId) -> Result<(usize, usize)> {
        for (s, stage) in self.stages.iter().enumerate() {
            if let Some(j) = stage.position_of(id) {
                return Ok((s, j));
            }
        }
        match self.history.iter().find(|job| job.id == id) {
            Some(job) => Err(Error::Conflict(format!(
                "job '{}' ({}) has already been retried",
                job.name, id
            ))),
            None => Err(Error::NotFound(format!("job {} in pipeline {}", id, self.id))),
        }
    }

    /// Apply a status reported by an execution backend or external system.
    pub fn report_status(&mut self, id: JobId, status: JobStatus) -> Result<Vec<Transition>> {
        let (s, j) = self.locate(id)?;
        let mut transitions = vec![self.stages[s].jobs_mut()[j].report(status)?];
        self.settle(&mut transitions);
        Ok(transitions)
    }

    /// Queue a manual job.
    pub fn play(&mut self, id: JobId) -> Result<Vec<Transition>> {
        let (s, j) = self.locate(id)?;
        let mut transitions = vec![self.stages[s].jobs_mut()[j].play()?];
        self.settle(&mut transitions);
        Ok(transitions)
    }

    /// Cancel one job. A job that already finished is left alone.
    pub fn cancel_job(&mut self, id: JobId) -> Result<Vec<Transition>> {
        let (s, j) = self.locate(id)?;
        let job = &mut self.stages[s].jobs_mut()[j];
        if !job.is_generic() && job.status().is_terminal() {
            return Ok(Vec::new());
        }
        let mut transitions = vec![job.cancel()?];
        self.settle(&mut transitions);
        Ok(transitions)
    }

    /// Cancel every job that is created, pending or running. Jobs parked in
    /// `manual` and externally reported jobs are left as they are.
    /// Canceling a pipeline with nothing left to cancel changes nothing.
    pub fn cancel(&mut self) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for stage in &mut self.stages {
            for job in stage.jobs_mut() {
                if job.is_cancelable() {
                    transitions.extend(job.cancel().ok());
                }
            }
        }
        if !transitions.is_empty() {
            self.settle(&mut transitions);
        }
        transitions
    }

    /// Retry a finished job, returning the id of its successor.
    pub fn retry(&mut self, id: JobId) -> Result<(JobId, Vec<Transition>)> {
        let (s, j) = self.locate(id)?;
        let (new_id, created) = self.supersede(s, j, true)?;
        let mut transitions = vec![created];
        transitions.extend(self.reopen_after(s));
        self.settle(&mut transitions);
        Ok((new_id, transitions))
    }

    /// Retry every failed or canceled job.
    ///
    /// Successors start in `created` and go through stage gating, so only
    /// the earliest affected stage is queued right away.
    pub fn retry_failed(&mut self) -> Result<(Vec<JobId>, Vec<Transition>)> {
        let targets: Vec<(usize, usize)> = self
            .stages
            .iter()
            .enumerate()
            .flat_map(|(s, stage)| {
                stage.jobs().iter().enumerate().filter_map(move |(j, job)| {
                    let failed = matches!(job.status(), JobStatus::Failed | JobStatus::Canceled);
                    (failed && job.is_retryable()).then_some((s, j))
                })
            })
            .collect();

        let Some(&(first_stage, _)) = targets.first() else {
            return Err(Error::InvalidAction(format!(
                "pipeline {} has no failed or canceled jobs to retry",
                self.id
            )));
        };

        let mut new_ids = Vec::with_capacity(targets.len());
        let mut transitions = Vec::new();
        for (s, j) in targets {
            let (new_id, created) = self.supersede(s, j, false)?;
            new_ids.push(new_id);
            transitions.push(created);
        }
        transitions.extend(self.reopen_after(first_stage));
        self.settle(&mut transitions);
        Ok((new_ids, transitions))
    }

    /// Replace job `j` of stage `s` with its successor. With `enqueue` the
    /// successor skips gating and is queued (or parked in `manual`) at once.
    fn supersede(&mut self, s: usize, j: usize, enqueue: bool) -> Result<(JobId, Transition)> {
        let mut successor = self.stages[s].jobs()[j].successor()?;
        if enqueue {
            successor.enqueue()?;
        }
        let new_id = successor.id;
        let created = Transition {
            job_id: new_id,
            job: successor.name.clone(),
            stage: successor.stage.clone(),
            from: None,
            to: successor.status(),
        };
        let mut retired = self.stages[s].replace(j, successor);
        retired.supersede(new_id);
        self.history.push(retired);
        Ok((new_id, created))
    }

    /// Give jobs skipped after stage `s` another chance at gating.
    fn reopen_after(&mut self, s: usize) -> Vec<Transition> {
        self.stages
            .iter_mut()
            .skip(s + 1)
            .flat_map(|stage| stage.jobs_mut().iter_mut())
            .filter(|job| job.status() == JobStatus::Skipped)
            .filter_map(|job| job.reopen().ok())
            .collect()
    }
}

fn check_generic(job: &Job) -> Result<()> {
    if job.is_generic() && !is_generic_status(job.status()) {
        return Err(Error::Internal(format!(
            "external job '{}' cannot be {}",
            job.name,
            job.status()
        )));
    }
    Ok(())
}

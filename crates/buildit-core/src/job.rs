//! Jobs and the per-job status state machine.
//!
//! A job only changes status through the methods here. Anything that
//! touches stage or pipeline aggregates goes through [`crate::Pipeline`],
//! which owns its jobs and refreshes the derived statuses after every
//! change.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::status::JobStatus;
use crate::{Error, JobId, Result};

/// How a build job leaves `created`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum When {
    /// Queued as soon as its stage becomes eligible.
    #[default]
    OnSuccess,
    /// Waits in `manual` until played.
    Manual,
}

/// What kind of work a job represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// Executed by one of our backends.
    Build { when: When },
    /// Status reported by an external system. Displayed and aggregated,
    /// but never retried, canceled or played from here.
    GenericStatus { target_url: Option<String> },
}

/// A single status change of a job. `from` is `None` when the job was just
/// created (a retry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub job_id: JobId,
    pub job: String,
    pub stage: String,
    pub from: Option<JobStatus>,
    pub to: JobStatus,
}

/// One job instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    /// Name of the owning stage.
    pub stage: String,
    /// Ordinal of the owning stage.
    pub stage_idx: usize,
    pub kind: JobKind,
    pub allow_failure: bool,
    status: JobStatus,
    /// The job this one was retried from.
    pub retry_of: Option<JobId>,
    superseded_by: Option<JobId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    fn with_kind(name: impl Into<String>, kind: JobKind, status: JobStatus) -> Self {
        Self {
            id: JobId::new(),
            name: name.into(),
            stage: String::new(),
            stage_idx: 0,
            kind,
            allow_failure: false,
            status,
            retry_of: None,
            superseded_by: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    /// A build job in `created`.
    pub fn build(name: impl Into<String>, when: When) -> Self {
        Self::with_kind(name, JobKind::Build { when }, JobStatus::Created)
    }

    /// An externally reported job with its current reported status.
    pub fn generic(
        name: impl Into<String>,
        target_url: Option<String>,
        status: JobStatus,
    ) -> Result<Self> {
        let name = name.into();
        if !is_generic_status(status) {
            return Err(Error::InvalidInput(format!(
                "external job '{}' cannot be reported as {}",
                name, status
            )));
        }
        Ok(Self::with_kind(
            name,
            JobKind::GenericStatus { target_url },
            status,
        ))
    }

    pub fn with_allow_failure(mut self, allow_failure: bool) -> Self {
        self.allow_failure = allow_failure;
        self
    }

    /// Set the status directly, bypassing the state machine. Only used when
    /// building records; [`crate::Pipeline::restore`] validates the result.
    pub(crate) fn with_status(mut self, status: JobStatus) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// The job that replaced this one through a retry, if any.
    pub fn superseded_by(&self) -> Option<JobId> {
        self.superseded_by
    }

    /// Not superseded by a retry.
    pub fn is_active(&self) -> bool {
        self.superseded_by.is_none()
    }

    pub fn is_generic(&self) -> bool {
        matches!(self.kind, JobKind::GenericStatus { .. })
    }

    pub fn is_manual(&self) -> bool {
        matches!(self.kind, JobKind::Build { when: When::Manual })
    }

    pub fn target_url(&self) -> Option<&str> {
        match &self.kind {
            JobKind::GenericStatus { target_url } => target_url.as_deref(),
            JobKind::Build { .. } => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        !self.is_generic() && self.is_active() && self.status.is_retryable()
    }

    pub fn is_playable(&self) -> bool {
        !self.is_generic() && self.is_active() && self.status == JobStatus::Manual
    }

    pub fn is_cancelable(&self) -> bool {
        !self.is_generic() && self.is_active() && self.status.is_cancelable()
    }

    fn transition(&mut self, to: JobStatus) -> Transition {
        let from = self.status;
        let now = Utc::now();
        self.status = to;
        if to == JobStatus::Running {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        Transition {
            job_id: self.id,
            job: self.name.clone(),
            stage: self.stage.clone(),
            from: Some(from),
            to,
        }
    }

    fn invalid(&self, action: &str) -> Error {
        Error::InvalidAction(format!(
            "cannot {} job '{}' in status {}",
            action, self.name, self.status
        ))
    }

    fn ensure_active(&self) -> Result<()> {
        match self.superseded_by {
            Some(successor) => Err(Error::Conflict(format!(
                "job '{}' ({}) was already retried as {}",
                self.name, self.id, successor
            ))),
            None => Ok(()),
        }
    }

    fn ensure_build(&self, action: &str) -> Result<()> {
        if self.is_generic() {
            return Err(Error::InvalidAction(format!(
                "cannot {} job '{}': its status is reported externally",
                action, self.name
            )));
        }
        Ok(())
    }

    /// `created → pending`, or `created → manual` for manual jobs.
    pub(crate) fn enqueue(&mut self) -> Result<Transition> {
        if self.is_generic() || self.status != JobStatus::Created {
            return Err(self.invalid("enqueue"));
        }
        let next = if self.is_manual() {
            JobStatus::Manual
        } else {
            JobStatus::Pending
        };
        Ok(self.transition(next))
    }

    /// `created → skipped`.
    pub(crate) fn skip(&mut self) -> Result<Transition> {
        if self.status != JobStatus::Created {
            return Err(self.invalid("skip"));
        }
        Ok(self.transition(JobStatus::Skipped))
    }

    /// `skipped → created`, so gating can decide again after an upstream retry.
    pub(crate) fn reopen(&mut self) -> Result<Transition> {
        if self.status != JobStatus::Skipped {
            return Err(self.invalid("reopen"));
        }
        self.finished_at = None;
        Ok(self.transition(JobStatus::Created))
    }

    /// `manual → pending`.
    pub(crate) fn play(&mut self) -> Result<Transition> {
        self.ensure_active()?;
        self.ensure_build("play")?;
        if self.status != JobStatus::Manual {
            return Err(self.invalid("play"));
        }
        Ok(self.transition(JobStatus::Pending))
    }

    /// `{created, pending, running} → canceled`.
    pub(crate) fn cancel(&mut self) -> Result<Transition> {
        self.ensure_active()?;
        self.ensure_build("cancel")?;
        if !self.status.is_cancelable() {
            return Err(self.invalid("cancel"));
        }
        Ok(self.transition(JobStatus::Canceled))
    }

    /// Apply a status reported from outside.
    ///
    /// Build jobs accept `pending → running`, `running → success | failed`
    /// and `pending → failed` for jobs dropped before they started. Generic
    /// jobs move freely between running, success, failed and canceled.
    pub(crate) fn report(&mut self, status: JobStatus) -> Result<Transition> {
        self.ensure_active()?;
        let allowed = match self.kind {
            JobKind::Build { .. } => matches!(
                (self.status, status),
                (JobStatus::Pending, JobStatus::Running)
                    | (JobStatus::Pending, JobStatus::Failed)
                    | (JobStatus::Running, JobStatus::Success)
                    | (JobStatus::Running, JobStatus::Failed)
            ),
            JobKind::GenericStatus { .. } => is_generic_status(status) && self.status != status,
        };
        if !allowed {
            return Err(Error::InvalidAction(format!(
                "job '{}' cannot move from {} to {}",
                self.name, self.status, status
            )));
        }
        Ok(self.transition(status))
    }

    /// Build the job that replaces this one on retry. The new job starts in
    /// `created`; the caller queues it or leaves it to stage gating.
    pub(crate) fn successor(&self) -> Result<Job> {
        self.ensure_active()?;
        self.ensure_build("retry")?;
        if !self.status.is_retryable() {
            return Err(self.invalid("retry"));
        }
        let mut next = Self::with_kind(self.name.clone(), self.kind.clone(), JobStatus::Created);
        next.stage = self.stage.clone();
        next.stage_idx = self.stage_idx;
        next.allow_failure = self.allow_failure;
        next.retry_of = Some(self.id);
        Ok(next)
    }

    pub(crate) fn supersede(&mut self, successor: JobId) {
        self.superseded_by = Some(successor);
    }
}

/// Statuses an external reporter may put a generic job in.
pub fn is_generic_status(status: JobStatus) -> bool {
    matches!(
        status,
        JobStatus::Running | JobStatus::Success | JobStatus::Failed | JobStatus::Canceled
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(name: &str) -> Job {
        let mut job = Job::build(name, When::OnSuccess);
        job.enqueue().unwrap();
        job
    }

    #[test]
    fn test_enqueue_follows_trigger_mode() {
        let mut auto = Job::build("build", When::OnSuccess);
        let mut manual = Job::build("deploy", When::Manual);
        assert_eq!(auto.enqueue().unwrap().to, JobStatus::Pending);
        assert_eq!(manual.enqueue().unwrap().to, JobStatus::Manual);
        assert!(manual.is_playable());
        assert!(matches!(auto.enqueue(), Err(Error::InvalidAction(_))));
    }

    #[test]
    fn test_backend_lifecycle_sets_timestamps() {
        let mut job = pending("test");
        let started = job.report(JobStatus::Running).unwrap();
        assert_eq!(started.from, Some(JobStatus::Pending));
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_none());

        job.report(JobStatus::Success).unwrap();
        assert_eq!(job.status(), JobStatus::Success);
        assert!(job.finished_at.is_some());
        assert!(job.is_retryable());
    }

    #[test]
    fn test_backend_cannot_skip_or_rewind() {
        let mut job = pending("test");
        assert!(job.report(JobStatus::Success).is_err());
        assert!(job.report(JobStatus::Canceled).is_err());
        job.report(JobStatus::Failed).unwrap();
        assert!(matches!(
            job.report(JobStatus::Running),
            Err(Error::InvalidAction(_))
        ));
        assert_eq!(job.status(), JobStatus::Failed);
    }

    #[test]
    fn test_play_only_from_manual() {
        let mut job = Job::build("manual-build", When::Manual);
        assert!(job.play().is_err());
        job.enqueue().unwrap();
        assert_eq!(job.play().unwrap().to, JobStatus::Pending);
        assert!(matches!(job.play(), Err(Error::InvalidAction(_))));
    }

    #[test]
    fn test_cancel_rejects_terminal_and_manual() {
        let mut running = pending("deploy");
        running.report(JobStatus::Running).unwrap();
        assert_eq!(running.cancel().unwrap().to, JobStatus::Canceled);
        assert!(matches!(running.cancel(), Err(Error::InvalidAction(_))));

        let mut manual = Job::build("manual-build", When::Manual);
        manual.enqueue().unwrap();
        assert!(manual.cancel().is_err());
        assert_eq!(manual.status(), JobStatus::Manual);
    }

    #[test]
    fn test_successor_keeps_slot_and_mode() {
        let mut job = Job::build("deploy", When::Manual).with_allow_failure(true);
        job.stage = "deploy".to_string();
        job.stage_idx = 2;
        job.enqueue().unwrap();
        job.play().unwrap();
        job.report(JobStatus::Running).unwrap();
        job.report(JobStatus::Failed).unwrap();

        let mut next = job.successor().unwrap();
        assert_ne!(next.id, job.id);
        assert_eq!(next.retry_of, Some(job.id));
        assert_eq!(next.status(), JobStatus::Created);
        next.enqueue().unwrap();
        assert_eq!(next.status(), JobStatus::Manual);
        assert_eq!(next.stage_idx, 2);
        assert!(next.allow_failure);

        job.supersede(next.id);
        assert!(matches!(job.successor(), Err(Error::Conflict(_))));
        assert!(!job.is_retryable());
    }

    #[test]
    fn test_running_job_is_not_retryable() {
        let mut job = pending("test");
        job.report(JobStatus::Running).unwrap();
        assert!(matches!(job.successor(), Err(Error::InvalidAction(_))));
    }

    #[test]
    fn test_generic_job_accepts_no_actions() {
        let mut job = Job::generic(
            "jenkins",
            Some("http://ci.example.com/status".to_string()),
            JobStatus::Success,
        )
        .unwrap();
        assert_eq!(job.target_url(), Some("http://ci.example.com/status"));
        assert!(!job.is_retryable());
        assert!(matches!(job.successor(), Err(Error::InvalidAction(_))));
        assert!(matches!(job.play(), Err(Error::InvalidAction(_))));
        assert!(matches!(job.cancel(), Err(Error::InvalidAction(_))));

        job.report(JobStatus::Failed).unwrap();
        assert!(job.report(JobStatus::Pending).is_err());
        assert!(job.report(JobStatus::Failed).is_err());
    }

    #[test]
    fn test_generic_job_rejects_non_reported_status() {
        assert!(matches!(
            Job::generic("jenkins", None, JobStatus::Manual),
            Err(Error::InvalidInput(_))
        ));
    }
}

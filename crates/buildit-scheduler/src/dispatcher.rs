//! Dispatcher - the single entry point for status reports and user actions.
//!
//! Each pipeline lives in its own slot guarded by an async mutex, so
//! mutations on one pipeline are serialized while different pipelines
//! proceed in parallel. A mutation runs against a copy of the pipeline,
//! is persisted, and only then replaces the live state and the published
//! snapshot. A failed store write leaves nothing observable.

use buildit_core::{
    CompositeStatus, Error, JobId, JobStatus, Pipeline, PipelineDefinition, PipelineId,
    PipelineStore, PipelineView, StageView, Transition,
};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::event::PipelineEvent;

/// A rejected or failed action. Rejections carry the pipeline state at the
/// time of rejection so callers can refresh.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ActionError {
    #[source]
    pub error: Error,
    pub current: Option<Arc<PipelineView>>,
}

impl ActionError {
    fn new(error: Error, current: Option<Arc<PipelineView>>) -> Self {
        Self { error, current }
    }
}

impl From<Error> for ActionError {
    fn from(error: Error) -> Self {
        Self::new(error, None)
    }
}

/// Result of an accepted action.
#[derive(Debug, Clone)]
pub struct ActionOutcome {
    /// The pipeline after the action, aggregates included.
    pub pipeline: Arc<PipelineView>,
    /// Job transitions the action caused, gating included. Empty for a
    /// no-op.
    pub transitions: Vec<Transition>,
}

impl ActionOutcome {
    /// Jobs created by the action (retries).
    pub fn created_jobs(&self) -> Vec<JobId> {
        self.transitions
            .iter()
            .filter(|t| t.from.is_none())
            .map(|t| t.job_id)
            .collect()
    }
}

struct Slot {
    pipeline: Mutex<Pipeline>,
    snapshot: watch::Sender<Arc<PipelineView>>,
}

impl Slot {
    fn new(pipeline: Pipeline) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(pipeline.view()));
        Self {
            pipeline: Mutex::new(pipeline),
            snapshot,
        }
    }

    fn current(&self) -> Arc<PipelineView> {
        self.snapshot.borrow().clone()
    }
}

/// Validates and applies actions against pipeline state.
pub struct Dispatcher {
    store: Arc<dyn PipelineStore>,
    slots: RwLock<HashMap<PipelineId, Arc<Slot>>>,
    jobs: RwLock<HashMap<JobId, PipelineId>>,
    events: broadcast::Sender<PipelineEvent>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn PipelineStore>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            store,
            slots: RwLock::new(HashMap::new()),
            jobs: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Load every pipeline from the store. Returns how many were loaded.
    pub async fn recover(&self) -> buildit_core::Result<usize> {
        let ids = self.store.list().await?;
        for id in &ids {
            let record = self.store.load(*id).await?;
            let pipeline = Pipeline::restore(record)?;
            debug!(pipeline_id = %id, status = %pipeline.status(), "Recovered pipeline");
            self.insert(pipeline);
        }
        info!(count = ids.len(), "Recovered pipelines from store");
        Ok(ids.len())
    }

    /// Instantiate a pipeline definition for a ref and commit.
    pub async fn create(
        &self,
        definition: &PipelineDefinition,
        git_ref: &str,
        sha: &str,
    ) -> Result<Arc<PipelineView>, ActionError> {
        let pipeline = Pipeline::create(definition, git_ref, sha)?;
        self.store.save(&pipeline.to_record()).await.map_err(|e| {
            error!(pipeline = %definition.name, error = %e, "Failed to persist new pipeline");
            ActionError::from(e)
        })?;

        let id = pipeline.id();
        let status = pipeline.status();
        let slot = self.insert(pipeline);
        info!(pipeline_id = %id, pipeline = %definition.name, git_ref, sha, %status, "Created pipeline");
        let _ = self.events.send(PipelineEvent::PipelineCreated {
            pipeline_id: id,
            status,
        });
        Ok(slot.current())
    }

    /// Retry a finished job. Returns the successor's id.
    pub async fn retry(&self, job_id: JobId) -> Result<(JobId, ActionOutcome), ActionError> {
        let pipeline_id = self.pipeline_of(job_id)?;
        self.mutate(pipeline_id, "retry", |pipeline| pipeline.retry(job_id))
            .await
    }

    /// Retry every failed or canceled job of a pipeline.
    pub async fn retry_pipeline(
        &self,
        pipeline_id: PipelineId,
    ) -> Result<(Vec<JobId>, ActionOutcome), ActionError> {
        self.mutate(pipeline_id, "retry_pipeline", Pipeline::retry_failed)
            .await
    }

    /// Cancel everything still waiting or running. Succeeds without changes
    /// when there is nothing left to cancel.
    pub async fn cancel(&self, pipeline_id: PipelineId) -> Result<ActionOutcome, ActionError> {
        self.mutate(pipeline_id, "cancel", |pipeline| Ok(((), pipeline.cancel())))
            .await
            .map(|(_, outcome)| outcome)
    }

    /// Cancel a single job. Succeeds without changes if it already finished.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<ActionOutcome, ActionError> {
        let pipeline_id = self.pipeline_of(job_id)?;
        self.mutate(pipeline_id, "cancel_job", |pipeline| {
            Ok(((), pipeline.cancel_job(job_id)?))
        })
        .await
        .map(|(_, outcome)| outcome)
    }

    /// Queue a manual job.
    pub async fn play(&self, job_id: JobId) -> Result<ActionOutcome, ActionError> {
        let pipeline_id = self.pipeline_of(job_id)?;
        self.mutate(pipeline_id, "play", |pipeline| Ok(((), pipeline.play(job_id)?)))
            .await
            .map(|(_, outcome)| outcome)
    }

    /// Apply a status reported by an execution backend or external system.
    pub async fn report_status(
        &self,
        job_id: JobId,
        status: JobStatus,
    ) -> Result<ActionOutcome, ActionError> {
        let pipeline_id = self.pipeline_of(job_id)?;
        self.mutate(pipeline_id, "report_status", |pipeline| {
            Ok(((), pipeline.report_status(job_id, status)?))
        })
        .await
        .map(|(_, outcome)| outcome)
    }

    /// Latest published snapshot of a pipeline.
    pub fn get_pipeline(&self, id: PipelineId) -> buildit_core::Result<Arc<PipelineView>> {
        Ok(self.slot(id)?.current())
    }

    pub fn get_pipeline_status(&self, id: PipelineId) -> buildit_core::Result<CompositeStatus> {
        Ok(self.get_pipeline(id)?.status)
    }

    /// Active jobs grouped per stage.
    pub fn get_jobs(&self, id: PipelineId) -> buildit_core::Result<Vec<StageView>> {
        Ok(self.get_pipeline(id)?.stages.clone())
    }

    /// Snapshots of every known pipeline, oldest first.
    pub fn list(&self) -> Vec<Arc<PipelineView>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut views: Vec<Arc<PipelineView>> = slots.values().map(|s| s.current()).collect();
        views.sort_by_key(|view| view.id);
        views
    }

    /// Follow the snapshots of one pipeline.
    pub fn subscribe(
        &self,
        id: PipelineId,
    ) -> buildit_core::Result<watch::Receiver<Arc<PipelineView>>> {
        Ok(self.slot(id)?.snapshot.subscribe())
    }

    /// Follow change events of every pipeline.
    pub fn events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    fn insert(&self, pipeline: Pipeline) -> Arc<Slot> {
        let id = pipeline.id();
        {
            let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
            for job in pipeline.jobs().chain(pipeline.history()) {
                jobs.insert(job.id, id);
            }
        }
        let slot = Arc::new(Slot::new(pipeline));
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, slot.clone());
        slot
    }

    fn slot(&self, id: PipelineId) -> buildit_core::Result<Arc<Slot>> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("pipeline {}", id)))
    }

    fn pipeline_of(&self, job_id: JobId) -> Result<PipelineId, ActionError> {
        self.jobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_id)
            .copied()
            .ok_or_else(|| ActionError::from(Error::NotFound(format!("job {}", job_id))))
    }

    /// Run `apply` on a copy of the pipeline inside its critical section,
    /// persist the result and publish it.
    async fn mutate<T, F>(
        &self,
        pipeline_id: PipelineId,
        action: &'static str,
        apply: F,
    ) -> Result<(T, ActionOutcome), ActionError>
    where
        F: FnOnce(&mut Pipeline) -> buildit_core::Result<(T, Vec<Transition>)>,
    {
        let slot = self.slot(pipeline_id)?;
        let mut live = slot.pipeline.lock().await;

        let mut working = live.clone();
        let (value, transitions) = match apply(&mut working) {
            Ok(applied) => applied,
            Err(e) if e.is_rejection() => {
                warn!(%pipeline_id, action, error = %e, "Action rejected");
                return Err(ActionError::new(e, Some(slot.current())));
            }
            Err(e) => {
                warn!(%pipeline_id, action, error = %e, "Action failed");
                return Err(ActionError::from(e));
            }
        };

        if transitions.is_empty() {
            debug!(%pipeline_id, action, "Action changed nothing");
            let outcome = ActionOutcome {
                pipeline: slot.current(),
                transitions,
            };
            return Ok((value, outcome));
        }

        if let Err(e) = self.store.save(&working.to_record()).await {
            error!(%pipeline_id, action, error = %e, "Failed to persist pipeline, discarding changes");
            return Err(ActionError::from(e));
        }

        let events = changes(&live, &working, &transitions);
        *live = working;
        let view = Arc::new(live.view());
        slot.snapshot.send_replace(view.clone());

        {
            let mut jobs = self.jobs.write().unwrap_or_else(PoisonError::into_inner);
            for t in transitions.iter().filter(|t| t.from.is_none()) {
                jobs.insert(t.job_id, pipeline_id);
            }
        }

        for t in &transitions {
            debug!(%pipeline_id, stage = %t.stage, job = %t.job, to = %t.to, "Job transitioned");
        }
        info!(%pipeline_id, action, status = %view.status, changed = transitions.len(), "Action applied");

        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        drop(live);

        Ok((
            value,
            ActionOutcome {
                pipeline: view,
                transitions,
            },
        ))
    }
}

/// Events describing the step from `before` to `after`.
fn changes(before: &Pipeline, after: &Pipeline, transitions: &[Transition]) -> Vec<PipelineEvent> {
    let pipeline_id = after.id();
    let mut events: Vec<PipelineEvent> = transitions
        .iter()
        .map(|t| PipelineEvent::JobTransitioned {
            pipeline_id,
            transition: t.clone(),
        })
        .collect();

    for (old, new) in before.stages().iter().zip(after.stages()) {
        if old.status() != new.status() {
            events.push(PipelineEvent::StageStatusChanged {
                pipeline_id,
                stage: new.name().to_string(),
                status: new.status(),
            });
        }
    }

    if before.status() != after.status() {
        events.push(PipelineEvent::PipelineStatusChanged {
            pipeline_id,
            status: after.status(),
        });
    }

    events
}

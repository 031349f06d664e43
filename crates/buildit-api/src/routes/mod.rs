//! API routes.

pub mod health;
pub mod jobs;
pub mod pipelines;

use crate::AppState;
use crate::ws::ws_handler;
use axum::Router;
use axum::routing::get;
use buildit_core::{JobId, PipelineView, Transition};
use serde::Serialize;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_router())
        .route("/ws", get(ws_handler))
        .merge(health::router())
        .with_state(state)
}

fn api_router() -> Router<AppState> {
    Router::new()
        .nest("/pipelines", pipelines::router())
        .nest("/jobs", jobs::router())
}

/// Body returned by every accepted action.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    /// Jobs created by the action, in creation order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub created: Vec<JobId>,
    pub transitions: Vec<Transition>,
    pub pipeline: PipelineView,
}

impl From<buildit_scheduler::ActionOutcome> for ActionResponse {
    fn from(outcome: buildit_scheduler::ActionOutcome) -> Self {
        Self {
            created: outcome.created_jobs(),
            pipeline: outcome.pipeline.as_ref().clone(),
            transitions: outcome.transitions,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use buildit_core::{Job, JobStatus, PipelineRecord, PipelineStore, When};
    use buildit_scheduler::{Dispatcher, MemoryPipelineStore};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// A running pipeline with a failed test job, a manual job and an
    /// externally reported job.
    pub async fn observed_app() -> (Router, Arc<Dispatcher>, PipelineView) {
        let record = PipelineRecord::new("app", "master", "1f2e3d4c")
            .stage("build", vec![Job::build("build", When::OnSuccess)])
            .stage("test", vec![Job::build("test", When::OnSuccess)])
            .stage(
                "deploy",
                vec![
                    Job::build("deploy", When::OnSuccess),
                    Job::build("manual-build", When::Manual),
                ],
            )
            .stage(
                "external",
                vec![
                    Job::generic(
                        "jenkins",
                        Some("http://gitlab.com/status".to_string()),
                        JobStatus::Success,
                    )
                    .unwrap(),
                ],
            )
            .with_job_status("build", "build", JobStatus::Success)
            .and_then(|record| record.with_job_status("test", "test", JobStatus::Failed))
            .and_then(|record| record.with_job_status("deploy", "deploy", JobStatus::Running))
            .and_then(|record| record.with_job_status("deploy", "manual-build", JobStatus::Manual))
            .unwrap();
        let id = record.id;
        let store = Arc::new(MemoryPipelineStore::new());
        store.save(&record).await.unwrap();

        let dispatcher = Arc::new(Dispatcher::new(store, 16));
        dispatcher.recover().await.unwrap();
        let view = dispatcher.get_pipeline(id).unwrap().as_ref().clone();
        (router(AppState::new(dispatcher.clone())), dispatcher, view)
    }

    pub fn empty_app() -> (Router, Arc<Dispatcher>) {
        let dispatcher = Arc::new(Dispatcher::new(Arc::new(MemoryPipelineStore::new()), 16));
        (router(AppState::new(dispatcher.clone())), dispatcher)
    }

    pub async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

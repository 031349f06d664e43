//! Job action endpoints.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use buildit_core::{JobId, JobStatus};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::ActionResponse;
use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/retry", post(retry_job))
        .route("/{id}/play", post(play_job))
        .route("/{id}/cancel", post(cancel_job))
        .route("/{id}/status", post(report_status))
}

async fn retry_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError> {
    let (new_id, outcome) = state.dispatcher.retry(JobId::from_uuid(id)).await?;
    info!(job_id = %id, new_job_id = %new_id, "Job retried via API");
    Ok(Json(outcome.into()))
}

async fn play_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError> {
    let outcome = state.dispatcher.play(JobId::from_uuid(id)).await?;
    Ok(Json(outcome.into()))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError> {
    let outcome = state.dispatcher.cancel_job(JobId::from_uuid(id)).await?;
    Ok(Json(outcome.into()))
}

#[derive(Debug, Deserialize)]
struct ReportStatusRequest {
    status: String,
}

/// Status report from an execution backend or external system.
async fn report_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReportStatusRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let status: JobStatus = req.status.parse()?;
    let outcome = state
        .dispatcher
        .report_status(JobId::from_uuid(id), status)
        .await?;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{observed_app, send};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_retry_failed_job() {
        let (app, _, view) = observed_app().await;
        let old = view.active_job("test", "test").unwrap().id;
        let uri = format!("/api/v1/jobs/{}/retry", old);

        let (status, body) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let created = body["created"][0].as_str().unwrap().to_string();
        assert_ne!(created, old.to_string());
        assert_eq!(body["pipeline"]["stages"][1]["jobs"][0]["id"], created);
        assert_eq!(body["pipeline"]["stages"][1]["jobs"][0]["status"], "pending");
        assert_eq!(body["pipeline"]["retried"][0]["retried"], true);

        let (status, body) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["current"]["stages"][1]["jobs"][0]["id"], created);
    }

    #[tokio::test]
    async fn test_retry_external_job_is_rejected() {
        let (app, _, view) = observed_app().await;
        let jenkins = view.active_job("external", "jenkins").unwrap().id;

        let (status, body) =
            send(&app, "POST", &format!("/api/v1/jobs/{}/retry", jenkins), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["current"]["status"], "running");
    }

    #[tokio::test]
    async fn test_play_then_report() {
        let (app, _, view) = observed_app().await;
        let manual = view.active_job("deploy", "manual-build").unwrap().id;

        let (status, body) =
            send(&app, "POST", &format!("/api/v1/jobs/{}/play", manual), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pipeline"]["stages"][2]["jobs"][1]["status"], "pending");

        let uri = format!("/api/v1/jobs/{}/status", manual);
        let (status, body) = send(&app, "POST", &uri, Some(json!({ "status": "running" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transitions"][0]["to"], "running");

        let (status, _) =
            send(&app, "POST", &format!("/api/v1/jobs/{}/play", manual), None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_report_unknown_status_is_bad_request() {
        let (app, _, view) = observed_app().await;
        let deploy = view.active_job("deploy", "deploy").unwrap().id;
        let uri = format!("/api/v1/jobs/{}/status", deploy);

        let (status, _) = send(&app, "POST", &uri, Some(json!({ "status": "exploded" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cancel_single_job() {
        let (app, dispatcher, view) = observed_app().await;
        let deploy = view.active_job("deploy", "deploy").unwrap().id;

        let (status, body) =
            send(&app, "POST", &format!("/api/v1/jobs/{}/cancel", deploy), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["transitions"][0]["to"], "canceled");
        assert_eq!(
            dispatcher.get_pipeline_status(view.id).unwrap(),
            buildit_core::CompositeStatus::Canceled
        );

        let unknown = format!("/api/v1/jobs/{}/cancel", uuid::Uuid::now_v7());
        let (status, _) = send(&app, "POST", &unknown, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

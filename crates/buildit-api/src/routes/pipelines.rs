//! Pipeline endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use buildit_core::{PipelineDefinition, PipelineId, PipelineView, StageView};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::ActionResponse;
use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pipelines).post(create_pipeline))
        .route("/{id}", get(get_pipeline))
        .route("/{id}/jobs", get(list_jobs))
        .route("/{id}/cancel", post(cancel_pipeline))
        .route("/{id}/retry", post(retry_pipeline))
}

async fn list_pipelines(State(state): State<AppState>) -> Json<Vec<PipelineView>> {
    let pipelines = state
        .dispatcher
        .list()
        .into_iter()
        .map(|view| view.as_ref().clone())
        .collect();
    Json(pipelines)
}

/// A pipeline is created either from `buildit.kdl` text or from an already
/// parsed definition.
#[derive(Debug, Deserialize)]
struct CreatePipelineRequest {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
    config: Option<String>,
    definition: Option<PipelineDefinition>,
}

async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<CreatePipelineRequest>,
) -> Result<(StatusCode, Json<PipelineView>), ApiError> {
    let definition = match (req.config, req.definition) {
        (Some(config), None) => buildit_config::parse_pipeline(&config)?,
        (None, Some(definition)) => definition,
        _ => {
            return Err(ApiError::BadRequest(
                "exactly one of 'config' or 'definition' is required".to_string(),
            ));
        }
    };

    let view = state
        .dispatcher
        .create(&definition, &req.git_ref, &req.sha)
        .await?;
    info!(pipeline_id = %view.id, pipeline = %view.name, "Pipeline created via API");
    Ok((StatusCode::CREATED, Json(view.as_ref().clone())))
}

async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineView>, ApiError> {
    let view = state.dispatcher.get_pipeline(PipelineId::from_uuid(id))?;
    Ok(Json(view.as_ref().clone()))
}

async fn list_jobs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<StageView>>, ApiError> {
    let stages = state.dispatcher.get_jobs(PipelineId::from_uuid(id))?;
    Ok(Json(stages))
}

async fn cancel_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError> {
    let outcome = state.dispatcher.cancel(PipelineId::from_uuid(id)).await?;
    Ok(Json(outcome.into()))
}

async fn retry_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ActionResponse>, ApiError> {
    let (_, outcome) = state
        .dispatcher
        .retry_pipeline(PipelineId::from_uuid(id))
        .await?;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{empty_app, observed_app, send};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_pipeline_and_jobs() {
        let (app, _, view) = observed_app().await;

        let (status, body) = send(&app, "GET", &format!("/api/v1/pipelines/{}", view.id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "running");
        assert_eq!(body["cancelable"], true);
        assert_eq!(body["retryable"], true);

        let (status, body) =
            send(&app, "GET", &format!("/api/v1/pipelines/{}/jobs", view.id), None).await;
        assert_eq!(status, StatusCode::OK);
        let stages = body.as_array().unwrap();
        assert_eq!(stages.len(), 4);
        assert_eq!(stages[1]["status"], "failed");
        assert_eq!(stages[3]["jobs"][0]["generic"], true);
        assert_eq!(
            stages[3]["jobs"][0]["target_url"],
            "http://gitlab.com/status"
        );
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_404() {
        let (app, _) = empty_app();
        let uri = format!("/api/v1/pipelines/{}", uuid::Uuid::now_v7());
        let (status, body) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_cancel_pipeline_twice() {
        let (app, _, view) = observed_app().await;
        let uri = format!("/api/v1/pipelines/{}/cancel", view.id);

        let (status, body) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pipeline"]["status"], "canceled");
        assert_eq!(body["transitions"].as_array().unwrap().len(), 1);

        let (status, body) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["transitions"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_pipeline() {
        let (app, _, view) = observed_app().await;
        let uri = format!("/api/v1/pipelines/{}/retry", view.id);

        let (status, body) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"].as_array().unwrap().len(), 1);
        assert_eq!(body["pipeline"]["retried"][0]["name"], "test");

        let (status, body) = send(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["current"]["id"], view.id.to_string());
    }

    #[tokio::test]
    async fn test_create_pipeline_from_kdl() {
        let (app, dispatcher) = empty_app();
        let config = r#"
            pipeline "service"
            stage "test" {
                job "unit"
                job "lint" allow_failure=#true
            }
            stage "deploy" {
                job "production" when="manual"
            }
        "#;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/pipelines",
            Some(json!({ "ref": "main", "sha": "abc123", "config": config })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "service");
        assert_eq!(body["status"], "pending");
        assert_eq!(body["stages"][0]["jobs"][0]["status"], "pending");
        assert_eq!(body["stages"][1]["jobs"][0]["status"], "created");
        assert_eq!(dispatcher.list().len(), 1);

        let (status, body) = send(&app, "GET", "/api/v1/pipelines", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_pipeline_rejects_bad_input() {
        let (app, _) = empty_app();

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/pipelines",
            Some(json!({ "ref": "main", "sha": "abc123" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/pipelines",
            Some(json!({
                "ref": "main",
                "sha": "abc123",
                "config": "pipeline \"x\"\nstage \"a\" { job \"j\" when=\"sometimes\" }",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

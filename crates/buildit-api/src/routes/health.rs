//! Health check endpoints.

use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::routing::get;
use serde_json::{Value, json};

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(ready))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ready",
        "pipelines": state.dispatcher.list().len(),
    }))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{empty_app, send};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_endpoints() {
        let (app, _) = empty_app();
        let (status, body) = send(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (status, body) = send(&app, "GET", "/health/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pipelines"], 0);
    }
}

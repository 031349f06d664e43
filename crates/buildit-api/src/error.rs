//! API error handling.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use buildit_core::PipelineView;
use buildit_scheduler::ActionError;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

/// API error type.
///
/// Rejected actions carry the pipeline as it was when the action was
/// refused, so clients can redraw without a second request.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{message}")]
    Conflict {
        message: String,
        current: Option<Arc<PipelineView>>,
    },
    #[error("{message}")]
    InvalidAction {
        message: String,
        current: Option<Arc<PipelineView>>,
    },
    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, current) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Conflict { message, current } => (StatusCode::CONFLICT, message, current),
            ApiError::InvalidAction { message, current } => {
                (StatusCode::UNPROCESSABLE_ENTITY, message, current)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
        };

        let body = match current {
            Some(current) => Json(json!({
                "error": message,
                "current": current.as_ref(),
            })),
            None => Json(json!({
                "error": message
            })),
        };

        (status, body).into_response()
    }
}

impl From<buildit_core::Error> for ApiError {
    fn from(err: buildit_core::Error) -> Self {
        ActionError {
            error: err,
            current: None,
        }
        .into()
    }
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        use buildit_core::Error;

        let ActionError { error, current } = err;
        match error {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Conflict(message) => ApiError::Conflict { message, current },
            Error::InvalidAction(message) => ApiError::InvalidAction { message, current },
            other @ (Error::Storage(_) | Error::Internal(_)) => {
                tracing::error!(error = %other, "Request failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl From<buildit_config::ConfigError> for ApiError {
    fn from(err: buildit_config::ConfigError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::engine::error::EngineError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

/// Application error type that converts to HTTP responses.
pub enum AppError {
    BadRequest(String),
    Engine(EngineError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Engine(e) => match e {
                EngineError::NotFound(_) | EngineError::UnknownWorkflow(_) => StatusCode::NOT_FOUND,
                EngineError::SchemaValidation { .. } | EngineError::IncompleteResume { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                EngineError::StepMismatch { .. } | EngineError::InvalidTransition { .. } => {
                    StatusCode::CONFLICT
                }
                EngineError::InvalidDefinition(_) | EngineError::Storage(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            AppError::BadRequest(msg) => ErrorResponse {
                error: msg,
                kind: "BadRequest".to_string(),
                details: Vec::new(),
            },
            AppError::Engine(err) => {
                if status.is_server_error() {
                    error!(error = %err, "Request failed");
                }
                ErrorResponse {
                    error: err.to_string(),
                    kind: err.kind().to_string(),
                    details: err.details(),
                }
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

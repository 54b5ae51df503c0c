use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use calmline_core::error::{self, ApiError};

/// Request-level failures, rendered as structured `ApiError` bodies.
#[derive(Debug)]
pub enum AppError {
    /// Validation error (400)
    Validation {
        message: String,
        field: Option<String>,
        received: Option<serde_json::Value>,
        docs_hint: Option<String>,
    },
    /// Unknown route (404)
    NotFound { resource: String },
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let request_id = uuid::Uuid::now_v7().to_string();

        let (status, api_error) = match self {
            AppError::Validation {
                message,
                field,
                received,
                docs_hint,
            } => (
                StatusCode::BAD_REQUEST,
                ApiError {
                    error: error::codes::VALIDATION_FAILED.to_string(),
                    message,
                    field,
                    received,
                    request_id,
                    docs_hint,
                },
            ),
            AppError::NotFound { resource } => (
                StatusCode::NOT_FOUND,
                ApiError {
                    error: error::codes::NOT_FOUND.to_string(),
                    message: format!("No such resource: {resource}"),
                    field: None,
                    received: None,
                    request_id,
                    docs_hint: Some("See /swagger-ui for the available endpoints.".to_string()),
                },
            ),
        };

        (status, Json(api_error)).into_response()
    }
}

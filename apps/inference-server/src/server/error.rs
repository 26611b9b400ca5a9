//! Error type for the API layer

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::classifier::ClassifierError;
use crate::metrics::MetricsError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed upload: {0}")]
    Upload(#[from] MultipartError),

    #[error("Model service error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            // 413 when the body limit was hit, 400 for a malformed form.
            ApiError::Upload(e) => (e.status(), e.body_text()),
            ApiError::Classifier(e) => {
                tracing::error!("Model service error: {}", e);
                (StatusCode::BAD_GATEWAY, "Prediction failed. Model service unavailable.".to_string())
            }
            ApiError::Store(e) => {
                tracing::error!("Storage error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to persist prediction".to_string())
            }
            ApiError::Metrics(e) => {
                tracing::error!("Metrics exposition error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics".to_string())
            }
        };

        let body = Json(json!({
            "error": true,
            "message": message,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;

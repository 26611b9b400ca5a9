// [[PAWS]]/apps/inference-server/src/server/handlers.rs
// Purpose: API Handlers. Every prediction is tracked before it is persisted.
// Architecture: API Layer
// Dependencies: Axum, Tracker, Store

use axum::{
    extract::{Json, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use super::error::{ApiError, Result};
use super::AppState;
use crate::models::*;
use crate::security::Authorized;

#[derive(serde::Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: &'static str,
    model_loaded: bool,
    storage: &'static str,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (db_ok, model_loaded) = tokio::join!(state.store.ping(), state.classifier.is_ready());
    state.tracker.update_db_status(db_ok);

    Json(HealthResponse {
        status: if db_ok && model_loaded { "healthy" } else { "degraded" },
        database: if db_ok { "connected" } else { "disconnected" },
        model_loaded,
        storage: state.store.backend(),
    })
}

struct Upload {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
    rgpd_consent: bool,
}

fn parse_consent(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        other => Err(ApiError::BadRequest(format!(
            "rgpd_consent must be true or false, got '{}'",
            other
        ))),
    }
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload> {
    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut rgpd_consent = false;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await?;
                file = Some((file_name, content_type, bytes.to_vec()));
            }
            Some("rgpd_consent") => {
                let raw = field.text().await?;
                rgpd_consent = parse_consent(&raw)?;
            }
            _ => {}
        }
    }

    let (file_name, content_type, bytes) =
        file.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;

    if bytes.is_empty() {
        return Err(ApiError::BadRequest("Uploaded file is empty".to_string()));
    }
    if !content_type.starts_with("image/") {
        return Err(ApiError::BadRequest(format!(
            "Unsupported content type '{}', expected an image",
            content_type
        )));
    }

    Ok(Upload { file_name, content_type, bytes, rgpd_consent })
}

pub async fn predict(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    mut multipart: Multipart,
) -> Result<Json<PredictionResponse>> {
    let upload = read_upload(&mut multipart).await?;
    tracing::info!(
        "Received image {} ({} bytes, consent={})",
        upload.file_name,
        upload.bytes.len(),
        upload.rgpd_consent
    );

    let started = Instant::now();
    let classified = state
        .classifier
        .classify(&upload.file_name, &upload.content_type, upload.bytes)
        .await;
    let inference_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let probabilities = match classified {
        Ok(probabilities) => probabilities,
        Err(e) => {
            state
                .tracker
                .track_prediction(&PredictionOutcome::failed(inference_time_ms));
            return Err(e.into());
        }
    };

    let (label, confidence) = probabilities.top();
    state.tracker.track_prediction(&PredictionOutcome {
        result: label,
        inference_time_ms,
        confidence,
        success: true,
    });

    let record = state
        .store
        .insert(NewPrediction::from_probabilities(
            probabilities,
            inference_time_ms,
            upload.rgpd_consent,
        ))
        .await?;

    tracing::info!(
        "Prediction {} stored: {} ({:.3}) in {}ms",
        record.id,
        label,
        confidence,
        inference_time_ms
    );

    Ok(Json(PredictionResponse {
        prediction: label,
        confidence,
        proba_cat: record.proba_cat,
        proba_dog: record.proba_dog,
        inference_time_ms,
        feedback_id: record.id,
    }))
}

pub async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    _auth: Authorized,
    Json(request): Json<FeedbackRequest>,
) -> Result<Json<serde_json::Value>> {
    let feedback = state
        .tracker
        .parse_user_feedback(&request.feedback)
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    if !state.store.record_feedback(request.feedback_id, feedback).await? {
        return Err(ApiError::NotFound(format!(
            "Prediction {} does not exist",
            request.feedback_id
        )));
    }

    state.tracker.track_user_feedback(feedback);

    Ok(Json(json!({
        "success": true,
        "feedback_id": request.feedback_id,
        "feedback": feedback,
    })))
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Response> {
    let body = state.tracker.metrics().render()?;
    Ok(([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

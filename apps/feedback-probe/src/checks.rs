// [[PAWS]]/apps/feedback-probe/src/checks.rs
// Purpose: Assertions applied to the server's answers and to the stored rows.
// Architecture: Probe Logic
// Dependencies: Serde, anyhow

use anyhow::{bail, ensure, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub model_loaded: Option<bool>,
}

impl HealthReport {
    pub fn check(&self) -> Result<()> {
        ensure!(
            matches!(self.status.as_str(), "healthy" | "degraded"),
            "unexpected health status '{}'",
            self.status
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionReply {
    pub prediction: String,
    pub confidence: f64,
    pub inference_time_ms: u64,
    pub feedback_id: Option<u64>,
}

/// A stored row as the probe reads it straight out of Redis.
#[derive(Debug, Clone, Deserialize)]
pub struct StoredPrediction {
    pub id: u64,
    pub prediction_result: String,
    pub proba_cat: f64,
    pub proba_dog: f64,
    pub inference_time_ms: u64,
    pub rgpd_consent: bool,
    pub created_at: String,
}

/// Checks that exactly one row appeared and that it is the one the API reported.
pub fn verify_persisted(
    before: u64,
    after: u64,
    newest: Option<&StoredPrediction>,
    reply: &PredictionReply,
) -> Result<()> {
    ensure!(
        after == before + 1,
        "row count went from {} to {}, expected exactly one new row",
        before,
        after
    );

    let Some(row) = newest else {
        bail!("no stored row found after prediction");
    };
    let Some(feedback_id) = reply.feedback_id else {
        bail!("prediction response carried no feedback_id");
    };

    ensure!(
        row.id == feedback_id,
        "newest row id {} does not match feedback_id {}",
        row.id,
        feedback_id
    );
    ensure!(
        row.prediction_result == reply.prediction,
        "stored result '{}' does not match predicted '{}'",
        row.prediction_result,
        reply.prediction
    );
    ensure!(
        row.inference_time_ms == reply.inference_time_ms,
        "stored inference time {}ms does not match reported {}ms",
        row.inference_time_ms,
        reply.inference_time_ms
    );
    ensure!(row.rgpd_consent, "stored row lost the consent flag");
    Ok(())
}

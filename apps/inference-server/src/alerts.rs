// [[PAWS]]/apps/inference-server/src/alerts.rs
// Purpose: High-latency alerting. The sink is optional and resolved once at boot.
// Architecture: Infrastructure Helper Layer
// Dependencies: reqwest, async-trait, serde_json

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Latency above which a single inference raises an alert.
pub const ALERT_THRESHOLD_MS: f64 = 1000.0;

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("alert transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("alert rejected with status {0}")]
    Rejected(reqwest::StatusCode),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlertEvent {
    pub latency_ms: f64,
    pub threshold_ms: f64,
}

impl AlertEvent {
    /// Builds an event only when `latency_ms` is strictly above the threshold.
    pub fn high_latency(latency_ms: f64) -> Option<Self> {
        (latency_ms > ALERT_THRESHOLD_MS).then_some(AlertEvent {
            latency_ms,
            threshold_ms: ALERT_THRESHOLD_MS,
        })
    }
}

/// Fire-and-forget notification target. Callers never await delivery on the
/// inference path; see `InferenceStats`.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send(&self, event: &AlertEvent) -> Result<(), AlertError>;
}

/// Posts high-latency alerts to a Discord webhook.
pub struct DiscordAlertSink {
    webhook_url: String,
    http_client: reqwest::Client,
}

impl DiscordAlertSink {
    pub fn new(webhook_url: String) -> Result<Self, AlertError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(DiscordAlertSink { webhook_url, http_client })
    }

    fn payload(event: &AlertEvent) -> serde_json::Value {
        json!({
            "content": format!(
                "High inference latency: {:.0}ms (threshold {:.0}ms)",
                event.latency_ms, event.threshold_ms
            ),
            "embeds": [{
                "title": "High latency detected",
                "color": 15158332,
                "fields": [
                    { "name": "Latency", "value": format!("{:.0} ms", event.latency_ms), "inline": true },
                    { "name": "Threshold", "value": format!("{:.0} ms", event.threshold_ms), "inline": true },
                ],
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }],
        })
    }
}

#[async_trait]
impl AlertSink for DiscordAlertSink {
    async fn send(&self, event: &AlertEvent) -> Result<(), AlertError> {
        tracing::debug!("Posting high latency alert to Discord: {:.0}ms", event.latency_ms);

        let response = self
            .http_client
            .post(&self.webhook_url)
            .json(&Self::payload(event))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::Rejected(status));
        }
        Ok(())
    }
}

// [[PAWS]]/apps/inference-server/src/metrics/tracker.rs
// Purpose: Routes prediction outcomes and API events into the metric collectors.
// Architecture: Observability Layer
// Dependencies: prometheus

use axum::http::StatusCode;
use prometheus::IntGauge;
use std::sync::Arc;
use std::time::Duration;

use super::{best_effort, InferenceStats, Metrics, MetricsError};
use crate::alerts::AlertSink;
use crate::models::{FeedbackType, PredictionLabel, PredictionOutcome, UnknownFeedbackType};

/// Holds one slot of `http_requests_in_progress` and releases it on drop,
/// so a request whose future is cancelled still decrements the gauge.
pub struct InFlightRequest {
    gauge: Option<IntGauge>,
}

impl Drop for InFlightRequest {
    fn drop(&mut self) {
        if let Some(gauge) = &self.gauge {
            gauge.dec();
        }
    }
}

/// Collapses a status code into its class label (`2xx`, `4xx`, ...).
pub fn status_class(status: StatusCode) -> String {
    format!("{}xx", status.as_u16() / 100)
}

/// Entry point the handlers call after every inference. Every method is
/// best-effort: failures are logged and never returned.
pub struct PredictionTracker {
    metrics: Metrics,
    stats: InferenceStats,
}

impl PredictionTracker {
    pub fn new(metrics: Metrics, alert_sink: Option<Arc<dyn AlertSink>>) -> Self {
        let stats = InferenceStats::new(
            metrics.avg_inference_seconds.clone(),
            metrics.last_inference_seconds.clone(),
            metrics.inference_time_ms.clone(),
            alert_sink,
        );
        PredictionTracker { metrics, stats }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    #[cfg(test)]
    pub fn stats(&self) -> &InferenceStats {
        &self.stats
    }

    pub fn track_prediction(&self, outcome: &PredictionOutcome) {
        let duration_seconds = outcome.duration_seconds();

        best_effort("count prediction", || {
            let success = if outcome.success { "true" } else { "false" };
            self.metrics
                .predictions_total
                .get_metric_with_label_values(&[outcome.result.as_str(), success])?
                .inc();
            Ok(())
        });

        best_effort("observe inference duration", || {
            self.metrics.inference_duration.observe(duration_seconds);
            Ok(())
        });

        self.stats.track_inference_time(duration_seconds);

        if outcome.result != PredictionLabel::Error {
            best_effort("observe prediction confidence", || {
                let confidence = outcome.confidence;
                if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
                    return Err(MetricsError::InvalidObservation {
                        metric: "cv_prediction_confidence",
                        value: confidence,
                    });
                }
                self.metrics
                    .prediction_confidence
                    .get_metric_with_label_values(&[outcome.result.as_str()])?
                    .observe(confidence);
                Ok(())
            });
        }

        tracing::debug!(
            "Tracked prediction result={} success={} time={}ms confidence={:.3}",
            outcome.result,
            outcome.success,
            outcome.inference_time_ms,
            outcome.confidence
        );
    }

    /// Accepts exactly `positive` or `negative`; anything else is logged and dropped.
    pub fn parse_user_feedback(
        &self,
        feedback_type: &str,
    ) -> Result<FeedbackType, UnknownFeedbackType> {
        feedback_type.parse::<FeedbackType>().map_err(|e| {
            tracing::warn!("Ignoring user feedback: {}", e);
            e
        })
    }

    pub fn track_user_feedback(&self, feedback: FeedbackType) {
        best_effort("count user feedback", || {
            self.metrics
                .user_feedback_total
                .get_metric_with_label_values(&[feedback.as_str()])?
                .inc();
            Ok(())
        });
        tracing::info!("Tracked user feedback: {}", feedback.as_str());
    }

    pub fn inc_http_request(&self, method: &str, endpoint: &str) {
        let method = method.to_uppercase();
        best_effort("count http request", || {
            self.metrics
                .http_requests_total
                .get_metric_with_label_values(&[method.as_str(), endpoint])?
                .inc();
            Ok(())
        });
    }

    /// Marks a request as in flight on `http_requests_in_progress{method,handler}`.
    pub fn begin_http_request(&self, method: &str, handler: &str) -> InFlightRequest {
        let gauge = match self
            .metrics
            .http_requests_in_progress
            .get_metric_with_label_values(&[method, handler])
        {
            Ok(gauge) => {
                gauge.inc();
                Some(gauge)
            }
            Err(e) => {
                tracing::warn!("Failed to track in-flight request: {}", e);
                None
            }
        };
        InFlightRequest { gauge }
    }

    pub fn observe_http_response(
        &self,
        method: &str,
        handler: &str,
        status: StatusCode,
        elapsed: Duration,
    ) {
        best_effort("observe http latency", || {
            self.metrics
                .http_request_duration
                .get_metric_with_label_values(&[method, handler])?
                .observe(elapsed.as_secs_f64());
            Ok(())
        });

        let status = status_class(status);
        best_effort("count http response", || {
            self.metrics
                .http_responses_total
                .get_metric_with_label_values(&[method, handler, status.as_str()])?
                .inc();
            Ok(())
        });
    }

    pub fn update_db_status(&self, is_connected: bool) {
        self.metrics.database_connected.set(i64::from(is_connected));
    }
}

// [[PAWS]]/apps/inference-server/src/metrics/mod.rs
// Purpose: Process-wide Prometheus registry and the collectors the API reports into.
// Architecture: Observability Layer
// Dependencies: prometheus

pub mod stats;
pub mod tracker;

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use thiserror::Error;

pub use stats::InferenceStats;
pub use tracker::PredictionTracker;

pub const INFERENCE_DURATION_BUCKETS: [f64; 7] = [0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
pub const CONFIDENCE_BUCKETS: [f64; 8] = [0.5, 0.6, 0.7, 0.8, 0.9, 0.95, 0.99, 1.0];
pub const HTTP_LATENCY_BUCKETS: [f64; 8] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0];

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("rejected observation for {metric}: {value}")]
    InvalidObservation { metric: &'static str, value: f64 },
    #[error("exposition is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// Runs one instrumentation step and swallows its failure.
///
/// Instrumentation must never fail the operation it observes, so every
/// tracking call goes through here instead of returning its error.
pub fn best_effort<F>(step: &str, op: F)
where
    F: FnOnce() -> Result<(), MetricsError>,
{
    if let Err(e) = op() {
        tracing::warn!("Failed to {}: {}", step, e);
    }
}

/// Every collector the service exposes, registered on one private registry.
///
/// Cloning is cheap: collectors are reference-counted handles.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,
    pub(crate) predictions_total: IntCounterVec,
    pub(crate) inference_duration: Histogram,
    pub(crate) prediction_confidence: HistogramVec,
    pub(crate) user_feedback_total: IntCounterVec,
    pub(crate) last_inference_seconds: Gauge,
    pub(crate) avg_inference_seconds: Gauge,
    pub(crate) inference_time_ms: Gauge,
    pub(crate) http_requests_total: IntCounterVec,
    pub(crate) database_connected: IntGauge,
    // Generic per-handler HTTP families, independent of the cv_* set.
    pub(crate) http_request_duration: HistogramVec,
    pub(crate) http_responses_total: IntCounterVec,
    pub(crate) http_requests_in_progress: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let database_connected = IntGauge::new(
            "cv_database_connected",
            "Database connection status (1=connected, 0=disconnected)",
        )?;

        let predictions_total = IntCounterVec::new(
            Opts::new("cv_predictions_total", "Total number of predictions"),
            &["result", "success"],
        )?;

        let inference_duration = Histogram::with_opts(
            HistogramOpts::new("cv_inference_duration_seconds", "Inference time in seconds")
                .buckets(INFERENCE_DURATION_BUCKETS.to_vec()),
        )?;

        let prediction_confidence = HistogramVec::new(
            HistogramOpts::new("cv_prediction_confidence", "Model confidence score")
                .buckets(CONFIDENCE_BUCKETS.to_vec()),
            &["result"],
        )?;

        let user_feedback_total = IntCounterVec::new(
            Opts::new("cv_user_feedback_total", "Number of user feedbacks collected"),
            &["feedback_type"],
        )?;

        let last_inference_seconds = Gauge::new(
            "cv_last_inference_seconds",
            "Inference time (seconds) for the most recent request",
        )?;

        let avg_inference_seconds = Gauge::new(
            "cv_avg_inference_seconds",
            "Average inference time (seconds) for all predictions",
        )?;

        let inference_time_ms = Gauge::new(
            "cv_inferencetime_ms",
            "Latest inference time in milliseconds (for alerting)",
        )?;

        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "cv_http_requests_total",
                "Total number of HTTP requests processed by the CV app",
            ),
            &["method", "endpoint"],
        )?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "Latency of HTTP requests by handler",
            )
            .buckets(HTTP_LATENCY_BUCKETS.to_vec()),
            &["method", "handler"],
        )?;

        let http_responses_total = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP responses by handler and status class"),
            &["method", "handler", "status"],
        )?;

        let http_requests_in_progress = IntGaugeVec::new(
            Opts::new("http_requests_in_progress", "HTTP requests currently being served"),
            &["method", "handler"],
        )?;

        registry.register(Box::new(database_connected.clone()))?;
        registry.register(Box::new(predictions_total.clone()))?;
        registry.register(Box::new(inference_duration.clone()))?;
        registry.register(Box::new(prediction_confidence.clone()))?;
        registry.register(Box::new(user_feedback_total.clone()))?;
        registry.register(Box::new(last_inference_seconds.clone()))?;
        registry.register(Box::new(avg_inference_seconds.clone()))?;
        registry.register(Box::new(inference_time_ms.clone()))?;
        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;
        registry.register(Box::new(http_responses_total.clone()))?;
        registry.register(Box::new(http_requests_in_progress.clone()))?;

        Ok(Metrics {
            registry: Arc::new(registry),
            predictions_total,
            inference_duration,
            prediction_confidence,
            user_feedback_total,
            last_inference_seconds,
            avg_inference_seconds,
            inference_time_ms,
            http_requests_total,
            database_connected,
            http_request_duration,
            http_responses_total,
            http_requests_in_progress,
        })
    }

    /// Text exposition of every registered family (`# HELP`, `# TYPE`, samples).
    pub fn render(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder.encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registers_all_families() {
        let metrics = Metrics::new().unwrap();
        metrics
            .predictions_total
            .with_label_values(&["cat", "true"])
            .inc();
        metrics.prediction_confidence.with_label_values(&["cat"]).observe(0.9);
        metrics.user_feedback_total.with_label_values(&["positive"]).inc();
        metrics.http_requests_total.with_label_values(&["GET", "/health"]).inc();
        metrics
            .http_request_duration
            .with_label_values(&["GET", "/health"])
            .observe(0.01);
        metrics
            .http_responses_total
            .with_label_values(&["GET", "/health", "2xx"])
            .inc();
        metrics
            .http_requests_in_progress
            .with_label_values(&["GET", "/health"])
            .set(0);

        let names: Vec<String> = metrics
            .registry
            .gather()
            .iter()
            .map(|f| f.get_name().to_string())
            .collect();

        for expected in [
            "cv_database_connected",
            "cv_predictions_total",
            "cv_inference_duration_seconds",
            "cv_prediction_confidence",
            "cv_user_feedback_total",
            "cv_last_inference_seconds",
            "cv_avg_inference_seconds",
            "cv_inferencetime_ms",
            "cv_http_requests_total",
            "http_request_duration_seconds",
            "http_requests_total",
            "http_requests_in_progress",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
    }

    #[test]
    fn test_render_uses_exposition_format() {
        let metrics = Metrics::new().unwrap();
        metrics
            .predictions_total
            .with_label_values(&["dog", "true"])
            .inc_by(3);

        let text = metrics.render().unwrap();
        assert!(text.contains("# HELP cv_predictions_total Total number of predictions"));
        assert!(text.contains("# TYPE cv_predictions_total counter"));
        assert!(text.contains("cv_predictions_total{result=\"dog\",success=\"true\"} 3"));
        assert!(text.contains("cv_inference_duration_seconds_bucket{le=\"0.25\"} 0"));
    }

    #[test]
    fn test_independent_instances_do_not_collide() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.database_connected.set(1);
        assert_eq!(b.database_connected.get(), 0);
    }

    #[test]
    fn test_best_effort_swallows_errors() {
        let mut ran = false;
        best_effort("run a failing step", || {
            ran = true;
            Err(MetricsError::InvalidObservation { metric: "test", value: f64::NAN })
        });
        assert!(ran);
    }
}

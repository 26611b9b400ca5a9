// [[PAWS]]/apps/inference-server/src/metrics/stats.rs
// Purpose: Lifetime mean of inference durations, last-seen gauges, latency alerts.
// Architecture: Observability Layer
// Dependencies: prometheus, tokio

use prometheus::Gauge;
use std::sync::{Arc, Mutex, PoisonError};

use crate::alerts::{AlertEvent, AlertSink};

/// Cumulative sum/count of every observed duration. Never reset.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct RunningAverage {
    sum: f64,
    count: u64,
}

impl RunningAverage {
    pub fn record(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    /// `None` until the first observation.
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.sum / self.count as f64)
    }

    #[cfg(test)]
    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

/// Owns the running average and the gauges derived from it.
pub struct InferenceStats {
    running: Mutex<RunningAverage>,
    avg_inference_seconds: Gauge,
    last_inference_seconds: Gauge,
    inference_time_ms: Gauge,
    alert_sink: Option<Arc<dyn AlertSink>>,
}

impl InferenceStats {
    pub fn new(
        avg_inference_seconds: Gauge,
        last_inference_seconds: Gauge,
        inference_time_ms: Gauge,
        alert_sink: Option<Arc<dyn AlertSink>>,
    ) -> Self {
        InferenceStats {
            running: Mutex::new(RunningAverage::default()),
            avg_inference_seconds,
            last_inference_seconds,
            inference_time_ms,
            alert_sink,
        }
    }

    /// Folds one duration into the lifetime mean, then refreshes the
    /// last-seen gauges and raises an alert when it is too slow.
    pub fn track_inference_time(&self, duration_seconds: f64) {
        if !duration_seconds.is_finite() || duration_seconds < 0.0 {
            tracing::warn!("Ignoring invalid inference duration: {}", duration_seconds);
            return;
        }

        let (avg, count) = {
            let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            running.record(duration_seconds);
            // count >= 1 here
            let avg = running.mean().unwrap_or(duration_seconds);
            self.avg_inference_seconds.set(avg);
            (avg, running.count())
        };

        tracing::debug!(
            "Tracked inference {:.3}s | Avg: {:.3}s (n={})",
            duration_seconds,
            avg,
            count
        );

        self.update_last_inference(duration_seconds);
    }

    /// Overwrites the last-seen gauges. No history is kept.
    pub fn update_last_inference(&self, duration_seconds: f64) {
        let latency_ms = duration_seconds * 1000.0;
        self.last_inference_seconds.set(duration_seconds);
        self.inference_time_ms.set(latency_ms);

        if let Some(event) = AlertEvent::high_latency(latency_ms) {
            tracing::warn!(
                "High latency detected: {:.0}ms > {:.0}ms",
                event.latency_ms,
                event.threshold_ms
            );
            self.dispatch_alert(event);
        }
    }

    /// Lifetime mean, or `None` before the first tracked inference.
    #[cfg(test)]
    pub fn average(&self) -> Option<f64> {
        self.snapshot().mean()
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> RunningAverage {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch_alert(&self, event: AlertEvent) {
        let Some(sink) = self.alert_sink.clone() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = sink.send(&event).await {
                        tracing::warn!("High latency alert dropped: {}", e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("No async runtime available, dropping high latency alert");
            }
        }
    }
}

// [[PAWS]]/apps/inference-server/src/server/mod.rs
// Purpose: Shared application state and router assembly.
// Architecture: API Layer
// Dependencies: Axum, Tower-HTTP

pub mod error;
pub mod handlers;

use axum::{
    extract::{DefaultBodyLimit, MatchedPath, Request, State},
    http::Method,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::classifier::Classifier;
use crate::config::ServerConfig;
use crate::metrics::PredictionTracker;
use crate::store::PredictionStore;

pub struct AppState {
    pub api_token: String,
    pub tracker: Arc<PredictionTracker>,
    pub store: Arc<dyn PredictionStore>,
    pub classifier: Arc<dyn Classifier>,
}

pub fn build_router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route("/api/predict", post(handlers::predict))
        .route("/api/feedback", post(handlers::submit_feedback));

    if config.enable_prometheus {
        app = app.route("/metrics", get(handlers::metrics));
        tracing::info!("Prometheus metrics enabled at /metrics");
    } else {
        tracing::info!("Prometheus metrics disabled");
    }

    app.route_layer(middleware::from_fn_with_state(
        state.clone(),
        track_http_requests,
    ))
    .layer(DefaultBodyLimit::max(config.max_upload_bytes))
    .layer(TraceLayer::new_for_http())
    .layer(cors)
    .with_state(state)
}

/// Instruments every routed request by method and route template: the
/// `cv_http_requests_total` counter plus the per-handler latency, status and
/// in-flight families.
async fn track_http_requests(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_owned();
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned())
        .unwrap_or_else(|| request.uri().path().to_owned());

    let in_flight = state.tracker.begin_http_request(&method, &endpoint);
    let started = Instant::now();
    let response = next.run(request).await;
    drop(in_flight);

    state
        .tracker
        .observe_http_response(&method, &endpoint, response.status(), started.elapsed());
    state.tracker.inc_http_request(&method, &endpoint);
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassifierError;
    use crate::metrics::Metrics;
    use crate::models::{ClassProbabilities, PredictionResponse};
    use crate::store::MemoryPredictionStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest, StatusCode};
    use tower::ServiceExt;

    const TOKEN: &str = "secret-token";
    const BOUNDARY: &str = "paws-test-boundary";

    struct FixedClassifier {
        answer: Option<ClassProbabilities>,
        ready: bool,
    }

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(
            &self,
            _file_name: &str,
            _content_type: &str,
            _image: Vec<u8>,
        ) -> Result<ClassProbabilities, ClassifierError> {
            self.answer
                .ok_or(ClassifierError::Status(reqwest::StatusCode::SERVICE_UNAVAILABLE))
        }

        async fn is_ready(&self) -> bool {
            self.ready
        }
    }

    struct Harness {
        app: Router,
        state: Arc<AppState>,
    }

    fn harness(answer: Option<ClassProbabilities>, ready: bool, enable_prometheus: bool) -> Harness {
        let state = Arc::new(AppState {
            api_token: TOKEN.to_string(),
            tracker: Arc::new(PredictionTracker::new(Metrics::new().unwrap(), None)),
            store: Arc::new(MemoryPredictionStore::new()),
            classifier: Arc::new(FixedClassifier { answer, ready }),
        });
        let config = ServerConfig {
            port: 0,
            api_token: TOKEN.to_string(),
            enable_prometheus,
            redis_url: None,
            model_service_url: "http://unused".to_string(),
            discord_webhook_url: None,
            max_upload_bytes: 1024 * 1024,
        };
        Harness {
            app: build_router(state.clone(), &config),
            state,
        }
    }

    fn cat_probabilities() -> Option<ClassProbabilities> {
        Some(ClassProbabilities { proba_cat: 0.95, proba_dog: 0.05 })
    }

    fn multipart_body(content_type: &str, image: &[u8], consent: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"cat.jpg\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(
            format!(
                "\r\n--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"rgpd_consent\"\r\n\r\n{consent}\r\n--{BOUNDARY}--\r\n"
            )
            .as_bytes(),
        );
        body
    }

    fn predict_request(token: Option<&str>, body: Vec<u8>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method("POST")
            .uri("/api/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn get_request(uri: &str) -> HttpRequest<Body> {
        HttpRequest::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn feedback_request(feedback_id: u64, feedback: &str) -> HttpRequest<Body> {
        HttpRequest::builder()
            .method("POST")
            .uri("/api/feedback")
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "feedback_id": feedback_id, "feedback": feedback }).to_string(),
            ))
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_health_reports_healthy() {
        let h = harness(cat_probabilities(), true, false);
        let response = h.app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["database"], "connected");
        assert_eq!(json["model_loaded"], true);
        assert_eq!(h.state.tracker.metrics().database_connected.get(), 1);
    }

    #[tokio::test]
    async fn test_health_degraded_without_model() {
        let h = harness(cat_probabilities(), false, false);
        let response = h.app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["model_loaded"], false);
    }

    #[tokio::test]
    async fn test_predict_persists_and_tracks() {
        let h = harness(cat_probabilities(), true, false);
        let body = multipart_body("image/jpeg", b"\xff\xd8\xff\xe0fake-jpeg", "true");

        let response = h
            .app
            .clone()
            .oneshot(predict_request(Some(TOKEN), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let prediction: PredictionResponse =
            serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(prediction.prediction.as_str(), "cat");
        assert_eq!(prediction.confidence, 0.95);
        assert_eq!(prediction.feedback_id, 1);

        assert_eq!(h.state.store.count().await.unwrap(), 1);
        let row = h.state.store.latest().await.unwrap().unwrap();
        assert_eq!(row.id, prediction.feedback_id);
        assert_eq!(row.inference_time_ms, prediction.inference_time_ms);
        assert_eq!(row.proba_cat, 95.0);
        assert!(row.rgpd_consent);

        let m = h.state.tracker.metrics();
        assert_eq!(m.predictions_total.with_label_values(&["cat", "true"]).get(), 1);
        assert_eq!(m.prediction_confidence.with_label_values(&["cat"]).get_sample_count(), 1);
        assert_eq!(
            m.http_requests_total.with_label_values(&["POST", "/api/predict"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_oversized_upload_is_payload_too_large() {
        let h = harness(cat_probabilities(), true, false);
        let image = vec![0xffu8; 2 * 1024 * 1024];
        let body = multipart_body("image/jpeg", &image, "true");

        let response = h
            .app
            .clone()
            .oneshot(predict_request(Some(TOKEN), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(h.state.store.count().await.unwrap(), 0);
        assert_eq!(h.state.tracker.stats().snapshot().count(), 0);
    }

    #[tokio::test]
    async fn test_predict_requires_token() {
        let h = harness(cat_probabilities(), true, false);
        let body = multipart_body("image/jpeg", b"jpeg", "true");

        let missing = h.app.clone().oneshot(predict_request(None, body.clone())).await.unwrap();
        assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

        let wrong = h
            .app
            .clone()
            .oneshot(predict_request(Some("nope"), body))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(h.state.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_predict_rejects_non_image() {
        let h = harness(cat_probabilities(), true, false);
        let body = multipart_body("text/plain", b"hello", "true");

        let response = h
            .app
            .clone()
            .oneshot(predict_request(Some(TOKEN), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(h.state.tracker.stats().snapshot().count(), 0);
    }

    #[tokio::test]
    async fn test_model_failure_tracks_error_outcome() {
        let h = harness(None, false, false);
        let body = multipart_body("image/jpeg", b"jpeg", "false");

        let response = h
            .app
            .clone()
            .oneshot(predict_request(Some(TOKEN), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let m = h.state.tracker.metrics();
        assert_eq!(m.predictions_total.with_label_values(&["error", "false"]).get(), 1);
        assert_eq!(m.inference_duration.get_sample_count(), 1);
        assert_eq!(h.state.store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_feedback_flow() {
        let h = harness(cat_probabilities(), true, false);
        let body = multipart_body("image/jpeg", b"jpeg", "true");
        let response = h
            .app
            .clone()
            .oneshot(predict_request(Some(TOKEN), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let ok = h.app.clone().oneshot(feedback_request(1, "positive")).await.unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let invalid = h.app.clone().oneshot(feedback_request(1, "meh")).await.unwrap();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let unknown = h.app.clone().oneshot(feedback_request(42, "negative")).await.unwrap();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        let m = h.state.tracker.metrics();
        assert_eq!(m.user_feedback_total.with_label_values(&["positive"]).get(), 1);
        assert_eq!(m.user_feedback_total.with_label_values(&["negative"]).get(), 0);
        assert_eq!(
            m.http_responses_total
                .with_label_values(&["POST", "/api/feedback", "4xx"])
                .get(),
            2
        );

        let row = h.state.store.latest().await.unwrap().unwrap();
        assert_eq!(row.user_feedback.map(|f| f.as_str()), Some("positive"));
    }

    #[tokio::test]
    async fn test_metrics_route_absent_when_disabled() {
        let h = harness(cat_probabilities(), true, false);
        let response = h.app.clone().oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_route_exposes_registry() {
        let h = harness(cat_probabilities(), true, true);
        let health = h.app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let response = h.app.clone().oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(content_type.starts_with("text/plain"));

        let text = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(text.contains("# TYPE cv_http_requests_total counter"));
        assert!(text.contains("endpoint=\"/health\""));
        assert!(text.contains("method=\"GET\""));
        assert!(text.contains("cv_database_connected 1"));
    }

    #[tokio::test]
    async fn test_metrics_route_exposes_per_handler_http_families() {
        let h = harness(cat_probabilities(), true, true);
        let health = h.app.clone().oneshot(get_request("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);

        let response = h.app.clone().oneshot(get_request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = String::from_utf8(body_bytes(response).await).unwrap();

        assert!(text.contains("# TYPE http_request_duration_seconds histogram"));
        assert!(text.contains("# TYPE http_requests_total counter"));
        assert!(text.contains("# TYPE http_requests_in_progress gauge"));
        assert!(text.contains("status=\"2xx\""));
        assert!(text.contains("handler=\"/health\""));

        // The scrape renders while its own request is still in flight.
        let m = h.state.tracker.metrics();
        let scraping = m.http_requests_in_progress.with_label_values(&["GET", "/metrics"]);
        assert_eq!(scraping.get(), 0);
        assert!(text.contains("http_requests_in_progress{handler=\"/metrics\",method=\"GET\"} 1"));
        assert_eq!(
            m.http_request_duration
                .with_label_values(&["GET", "/health"])
                .get_sample_count(),
            1
        );
        assert_eq!(
            m.http_requests_in_progress.with_label_values(&["GET", "/health"]).get(),
            0
        );
    }
}

// [[PAWS]]/apps/feedback-probe/src/main.rs
// Purpose: End-to-end probe. Health check, one prediction, then a direct look at Redis.
// Architecture: Integration Check (runs against a live deployment)
// Dependencies: reqwest, redis, image

mod checks;

use anyhow::{Context, Result};
use redis::AsyncCommands;
use std::env;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checks::{verify_persisted, HealthReport, PredictionReply, StoredPrediction};

const INDEX_KEY: &str = "predictions:index";

struct ProbeSettings {
    api_base_url: String,
    api_token: String,
    redis_url: String,
    test_image: PathBuf,
}

impl ProbeSettings {
    fn from_env() -> Result<Self> {
        Ok(ProbeSettings {
            api_base_url: env::var("API_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8002".to_string())
                .trim_end_matches('/')
                .to_string(),
            api_token: env::var("API_TOKEN").context("API_TOKEN must be set")?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            test_image: env::var("TEST_IMAGE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/raw/PetImages/Cat/0.jpg")),
        })
    }
}

async fn check_health(http: &reqwest::Client, settings: &ProbeSettings) -> Result<()> {
    tracing::info!("Step 1: health check");
    let response = http
        .get(format!("{}/health", settings.api_base_url))
        .timeout(Duration::from_secs(10))
        .send()
        .await
        .context("health endpoint unreachable")?;

    let status = response.status();
    tracing::info!("  status: {}", status);
    anyhow::ensure!(status == reqwest::StatusCode::OK, "health returned {}", status);

    let report: HealthReport = response.json().await.context("health body is not JSON")?;
    tracing::info!("  database: {:?}", report.database);
    tracing::info!("  model loaded: {:?}", report.model_loaded);
    report.check()?;

    tracing::info!("  healthcheck OK");
    Ok(())
}

/// Reads the configured image, or renders a plain red JPEG when it is missing.
fn load_test_image(path: &Path) -> Result<(String, Vec<u8>)> {
    if path.exists() {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        return Ok(("test_cat.jpg".to_string(), bytes));
    }

    tracing::warn!("Test image not found at {}, using a generated one", path.display());
    let img = image::RgbImage::from_pixel(128, 128, image::Rgb([255, 0, 0]));
    let mut buffer = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, image::ImageOutputFormat::Jpeg(90))
        .context("failed to encode placeholder image")?;
    Ok(("test_cat.jpg".to_string(), buffer.into_inner()))
}

async fn submit_prediction(
    http: &reqwest::Client,
    settings: &ProbeSettings,
) -> Result<PredictionReply> {
    tracing::info!("Step 2: prediction");
    let (file_name, bytes) = load_test_image(&settings.test_image)?;

    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name)
        .mime_str("image/jpeg")?;
    let form = reqwest::multipart::Form::new()
        .part("file", part)
        .text("rgpd_consent", "true");

    let response = http
        .post(format!("{}/api/predict", settings.api_base_url))
        .bearer_auth(&settings.api_token)
        .multipart(form)
        .timeout(Duration::from_secs(30))
        .send()
        .await
        .context("predict endpoint unreachable")?;

    let status = response.status();
    tracing::info!("  status: {}", status);
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("prediction failed with {}: {}", status, body);
    }

    let reply: PredictionReply = response.json().await.context("prediction body is not JSON")?;
    tracing::info!("  prediction: {}", reply.prediction);
    tracing::info!("  confidence: {}", reply.confidence);
    tracing::info!("  feedback id: {:?}", reply.feedback_id);
    Ok(reply)
}

async fn stored_count(con: &mut redis::aio::Connection) -> Result<u64> {
    Ok(con.llen(INDEX_KEY).await?)
}

async fn newest_row(con: &mut redis::aio::Connection) -> Result<Option<StoredPrediction>> {
    let id: Option<u64> = con.lindex(INDEX_KEY, -1).await?;
    let Some(id) = id else {
        return Ok(None);
    };
    let data: Option<String> = con.get(format!("prediction:{}", id)).await?;
    data.map(|json| serde_json::from_str(&json).context("stored row is not valid JSON"))
        .transpose()
}

async fn run(settings: &ProbeSettings) -> Result<()> {
    let http = reqwest::Client::new();
    let redis_client =
        redis::Client::open(settings.redis_url.as_str()).context("invalid REDIS_URL")?;
    let mut con = redis_client
        .get_async_connection()
        .await
        .context("Redis unreachable")?;

    check_health(&http, settings).await?;

    let before = stored_count(&mut con).await?;
    tracing::info!("Rows before prediction: {}", before);

    let reply = submit_prediction(&http, settings).await?;

    tracing::info!("Step 3: storage verification");
    let after = stored_count(&mut con).await?;
    let newest = newest_row(&mut con).await?;
    tracing::info!("  rows: {} -> {}", before, after);

    if let Some(row) = &newest {
        tracing::info!("  newest row:");
        tracing::info!("    id: {}", row.id);
        tracing::info!("    result: {}", row.prediction_result);
        tracing::info!("    cat: {}%", row.proba_cat);
        tracing::info!("    dog: {}%", row.proba_dog);
        tracing::info!("    inference time: {}ms", row.inference_time_ms);
        tracing::info!("    consent: {}", row.rgpd_consent);
        tracing::info!("    created at: {}", row.created_at);
    }

    verify_persisted(before, after, newest.as_ref(), &reply)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let outcome = match ProbeSettings::from_env() {
        Ok(settings) => run(&settings).await,
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => tracing::info!("SUCCESS: prediction was recorded in storage"),
        Err(e) => {
            tracing::error!("FAILURE: {:#}", e);
            std::process::exit(1);
        }
    }
}

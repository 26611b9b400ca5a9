// [[PAWS]]/apps/inference-server/src/classifier.rs
// Purpose: Client for the model service that scores uploaded images.
// Architecture: Infrastructure Layer
// Dependencies: reqwest, async-trait

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::models::ClassProbabilities;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model service answered {0}")]
    Status(reqwest::StatusCode),
    #[error("model service returned invalid probabilities: cat={0}, dog={1}")]
    InvalidProbabilities(f64, f64),
}

#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        file_name: &str,
        content_type: &str,
        image: Vec<u8>,
    ) -> Result<ClassProbabilities, ClassifierError>;

    /// Whether a model is loaded and able to answer.
    async fn is_ready(&self) -> bool;
}

pub struct RemoteClassifier {
    base_url: String,
    http_client: reqwest::Client,
}

impl RemoteClassifier {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClassifierError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(RemoteClassifier {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

fn validate(probabilities: ClassProbabilities) -> Result<ClassProbabilities, ClassifierError> {
    let in_range = |p: f64| p.is_finite() && (0.0..=1.0).contains(&p);
    if in_range(probabilities.proba_cat) && in_range(probabilities.proba_dog) {
        Ok(probabilities)
    } else {
        Err(ClassifierError::InvalidProbabilities(
            probabilities.proba_cat,
            probabilities.proba_dog,
        ))
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    async fn classify(
        &self,
        file_name: &str,
        content_type: &str,
        image: Vec<u8>,
    ) -> Result<ClassProbabilities, ClassifierError> {
        let url = format!("{}/predict", self.base_url);
        tracing::debug!("Sending {} bytes to model service: {}", image.len(), url);

        let part = reqwest::multipart::Part::bytes(image)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self.http_client.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClassifierError::Status(status));
        }

        validate(response.json::<ClassProbabilities>().await?)
    }

    async fn is_ready(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self
            .http_client
            .get(&url)
            .timeout(Duration::from_secs(2))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!("Model service not ready: {}", e);
                false
            }
        }
    }
}

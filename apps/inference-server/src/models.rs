// [[PAWS]]/apps/inference-server/src/models.rs
// Purpose: Domain types shared by the tracker, the store and the API layer.
// Architecture: Domain Model Layer
// Dependencies: Serde, Chrono

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Outcome class of a single prediction. Doubles as the `result` label.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PredictionLabel {
    Cat,
    Dog,
    Error,
}

impl PredictionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionLabel::Cat => "cat",
            PredictionLabel::Dog => "dog",
            PredictionLabel::Error => "error",
        }
    }
}

impl fmt::Display for PredictionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed inference, handed once to the tracker and then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionOutcome {
    pub result: PredictionLabel,
    pub inference_time_ms: u64,
    /// Probability of `result`, in [0, 1].
    pub confidence: f64,
    pub success: bool,
}

impl PredictionOutcome {
    pub fn failed(inference_time_ms: u64) -> Self {
        PredictionOutcome {
            result: PredictionLabel::Error,
            inference_time_ms,
            confidence: 0.0,
            success: false,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.inference_time_ms as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Positive,
    Negative,
}

impl FeedbackType {
    pub const VALID: [&'static str; 2] = ["positive", "negative"];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Positive => "positive",
            FeedbackType::Negative => "negative",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFeedbackType(pub String);

impl fmt::Display for UnknownFeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid feedback_type '{}', expected one of {:?}",
            self.0,
            FeedbackType::VALID
        )
    }
}

impl std::error::Error for UnknownFeedbackType {}

impl FromStr for FeedbackType {
    type Err = UnknownFeedbackType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "positive" => Ok(FeedbackType::Positive),
            "negative" => Ok(FeedbackType::Negative),
            other => Err(UnknownFeedbackType(other.to_string())),
        }
    }
}

/// Class probabilities returned by the model service, each in [0, 1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ClassProbabilities {
    pub proba_cat: f64,
    pub proba_dog: f64,
}

impl ClassProbabilities {
    /// Winning label and its probability. Ties go to `cat`.
    pub fn top(&self) -> (PredictionLabel, f64) {
        if self.proba_dog > self.proba_cat {
            (PredictionLabel::Dog, self.proba_dog)
        } else {
            (PredictionLabel::Cat, self.proba_cat)
        }
    }
}

/// Row fields supplied by the predict handler; the store assigns `id` and `created_at`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPrediction {
    pub prediction_result: PredictionLabel,
    pub proba_cat: f64,
    pub proba_dog: f64,
    pub inference_time_ms: u64,
    pub rgpd_consent: bool,
}

impl NewPrediction {
    /// Probabilities are persisted as percentages rounded to two decimals.
    pub fn from_probabilities(
        probabilities: ClassProbabilities,
        inference_time_ms: u64,
        rgpd_consent: bool,
    ) -> Self {
        let (label, _) = probabilities.top();
        NewPrediction {
            prediction_result: label,
            proba_cat: to_percent(probabilities.proba_cat),
            proba_dog: to_percent(probabilities.proba_dog),
            inference_time_ms,
            rgpd_consent,
        }
    }
}

fn to_percent(p: f64) -> f64 {
    (p * 10_000.0).round() / 100.0
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PredictionRecord {
    pub id: u64,
    pub prediction_result: PredictionLabel,
    pub proba_cat: f64,
    pub proba_dog: f64,
    pub inference_time_ms: u64,
    pub rgpd_consent: bool,
    #[serde(default)]
    pub user_feedback: Option<FeedbackType>,
    pub created_at: String,
}

impl PredictionRecord {
    pub fn from_new(id: u64, new: NewPrediction) -> Self {
        PredictionRecord {
            id,
            prediction_result: new.prediction_result,
            proba_cat: new.proba_cat,
            proba_dog: new.proba_dog,
            inference_time_ms: new.inference_time_ms,
            rgpd_consent: new.rgpd_consent,
            user_feedback: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub prediction: PredictionLabel,
    pub confidence: f64,
    pub proba_cat: f64,
    pub proba_dog: f64,
    pub inference_time_ms: u64,
    pub feedback_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    pub feedback_id: u64,
    pub feedback: String,
}

//! The pose-classification oracle.
//!
//! Classification itself is external: frames are shipped to an inference
//! endpoint that was trained on a fixed set of pose classes and returns one
//! confidence per class. The trait keeps the rest of the system independent
//! of where that model actually runs.

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// A single class score produced by the model for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    pub confidence: f32,
}

/// One entry per known class, in model order. Ephemeral per frame.
pub type Classification = Vec<Prediction>;

/// Returns the highest-confidence entry; ties keep the first maximum.
pub fn top_prediction(classification: &[Prediction]) -> Option<&Prediction> {
    let mut best = classification.first()?;
    for prediction in classification {
        if prediction.confidence > best.confidence {
            best = prediction;
        }
    }
    Some(best)
}

/// A generic client for a pose-classification model.
#[async_trait]
pub trait PoseClassifier: Send + Sync {
    /// The class labels the model was trained on, in model order.
    fn labels(&self) -> &[String];

    /// Classifies a single camera frame, returning one score per label.
    async fn classify(&self, frame: &[u8]) -> Result<Classification>;
}

#[derive(Deserialize)]
struct ModelMetadata {
    labels: Vec<String>,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    image: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    predictions: Vec<Prediction>,
}

/// An implementation of `PoseClassifier` backed by an HTTP inference server.
///
/// The server is expected to expose `GET /metadata` (the class labels, read
/// once at connect time) and `POST /classify` (a base64-encoded frame in,
/// per-class confidences out).
pub struct HttpPoseClassifier {
    client: reqwest::Client,
    base_url: String,
    labels: Vec<String>,
}

impl HttpPoseClassifier {
    /// Connects to the inference server and loads the model metadata.
    ///
    /// Fails if the endpoint is unreachable or advertises no classes, so a
    /// session can never start against a model that did not load.
    pub async fn connect(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::new();
        let base_url = base_url.trim_end_matches('/').to_owned();

        let metadata: ModelMetadata = client
            .get(format!("{}/metadata", base_url))
            .send()
            .await
            .context("Failed to reach the pose model endpoint")?
            .error_for_status()
            .context("Pose model endpoint rejected the metadata request")?
            .json()
            .await
            .context("Pose model metadata is not valid JSON")?;
        ensure!(
            !metadata.labels.is_empty(),
            "Pose model metadata lists no classes"
        );

        Ok(Self {
            client,
            base_url,
            labels: metadata.labels,
        })
    }
}

#[async_trait]
impl PoseClassifier for HttpPoseClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    async fn classify(&self, frame: &[u8]) -> Result<Classification> {
        let image = base64::engine::general_purpose::STANDARD.encode(frame);
        let response: ClassifyResponse = self
            .client
            .post(format!("{}/classify", self.base_url))
            .json(&ClassifyRequest { image: &image })
            .send()
            .await
            .context("Classification request failed")?
            .error_for_status()
            .context("Pose model endpoint rejected the frame")?
            .json()
            .await
            .context("Classification response is not valid JSON")?;
        ensure!(
            !response.predictions.is_empty(),
            "Classification response contains no predictions"
        );
        Ok(response.predictions)
    }
}

/// A `PoseClassifier` that always returns the same scores.
///
/// Useful for development without a camera or model server, and for driving
/// the session deterministically in tests.
pub struct StaticClassifier {
    labels: Vec<String>,
    scores: Classification,
}

impl StaticClassifier {
    pub fn new(scores: Vec<(&str, f32)>) -> Self {
        Self {
            labels: scores.iter().map(|(label, _)| (*label).to_owned()).collect(),
            scores: scores
                .into_iter()
                .map(|(label, confidence)| Prediction {
                    label: label.to_owned(),
                    confidence,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl PoseClassifier for StaticClassifier {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    async fn classify(&self, _frame: &[u8]) -> Result<Classification> {
        Ok(self.scores.clone())
    }
}

//! Face landmark detection
//!
//! Detection itself is an external black box. [`FaceDetector`] returns one
//! landmark set per visible face; [`HttpLandmarkDetector`] forwards the raw
//! frame to a detection service over HTTP.

use super::Frame;
use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::{Landmark, LandmarkSet};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait FaceDetector: Send + Sync {
    fn name(&self) -> &str;

    /// One entry per detected face, empty when no face is visible
    async fn detect(&self, frame: &Frame) -> Result<Vec<LandmarkSet>, EngineError>;
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    #[serde(default)]
    faces: Vec<DetectedFace>,
}

#[derive(Debug, Deserialize)]
struct DetectedFace {
    #[serde(default)]
    landmarks: Vec<Landmark>,
}

/// Posts frames to `<url>` as `application/octet-stream` and expects
/// `{ "faces": [ { "landmarks": [ {"x":..,"y":..,"z":..}, ... ] } ] }`
pub struct HttpLandmarkDetector {
    url: String,
    client: reqwest::Client,
}

impl HttpLandmarkDetector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Network(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl FaceDetector for HttpLandmarkDetector {
    fn name(&self) -> &str {
        "http"
    }

    async fn detect(&self, frame: &Frame) -> Result<Vec<LandmarkSet>, EngineError> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/octet-stream")
            .body(frame.bytes().to_vec())
            .send()
            .await
            .map_err(|e| {
                EngineError::ServiceUnavailable(format!("Landmark detector unreachable: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(EngineError::ServiceUnavailable(format!(
                "Landmark detector returned {}",
                response.status()
            )));
        }

        let body: DetectionResponse = response.json().await.map_err(|e| {
            EngineError::ServiceUnavailable(format!("Unreadable detector response: {}", e))
        })?;

        // A face without landmarks still counts toward the face total
        let faces: Vec<LandmarkSet> = body
            .faces
            .into_iter()
            .map(|face| LandmarkSet::new(face.landmarks))
            .collect();

        debug!(
            "Detector found {} face(s) in {}x{} frame",
            faces.len(),
            frame.width(),
            frame.height()
        );

        Ok(faces)
    }
}

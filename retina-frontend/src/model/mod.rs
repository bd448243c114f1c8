//! Retinopathy classifier abstraction.
//!
//! A [`Classifier`] turns a fundus image on disk into a [`Prediction`]. The
//! network itself lives elsewhere (an ONNX export run with tract, or a
//! remote prediction endpoint); this module only loads it, feeds it and
//! shapes its outputs.

pub mod cache;
pub mod loader;
pub mod onnx;
pub mod postprocess;
pub mod preprocess;
pub mod remote;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub use cache::ModelCache;
pub use loader::BackendLoader;

/// Error type for model operations.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Checkpoint not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to load model: {0}")]
    Load(String),

    #[error("Invalid input image: {0}")]
    Input(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Prediction service error: {0}")]
    Remote(String),

    #[error("Model not configured: {0}")]
    Config(String),
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::Input(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            ModelError::Remote(msg) => AppError::BadGateway(msg),
            ModelError::NotFound(_) | ModelError::Load(_) | ModelError::Config(_) => {
                AppError::ServiceUnavailable(err.to_string())
            }
            ModelError::Inference(msg) => AppError::InternalError(anyhow::anyhow!(msg)),
        }
    }
}

/// DR grade on the international clinical scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    NoDr,
    Mild,
    Moderate,
    Severe,
    Proliferative,
}

impl Severity {
    pub fn from_grade(grade: u8) -> Self {
        match grade {
            0 => Severity::NoDr,
            1 => Severity::Mild,
            2 => Severity::Moderate,
            3 => Severity::Severe,
            _ => Severity::Proliferative,
        }
    }

    /// Grade closest to a regression score, clamped to the 0..=4 scale.
    pub fn grade_for_score(score: f32) -> u8 {
        if !score.is_finite() {
            return 0;
        }
        score.round().clamp(0.0, 4.0) as u8
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::NoDr => "No DR",
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::Severe => "Severe",
            Severity::Proliferative => "Proliferative DR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Model outputs for a single image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub image_id: String,
    /// Per-class scores (probabilities when softmax is applied).
    pub logits: Vec<f32>,
    pub regression: f32,
    /// Sum of ordinal threshold probabilities.
    pub ordinal: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<Vec<f32>>,
}

impl Prediction {
    pub fn grade(&self) -> u8 {
        Severity::grade_for_score(self.regression)
    }

    pub fn severity(&self) -> Severity {
        Severity::from_grade(self.grade())
    }
}

#[async_trait]
pub trait Classifier: Send + Sync {
    /// Identifies the loaded network in logs.
    fn name(&self) -> &str;

    async fn predict(&self, image_path: &Path) -> Result<Prediction, ModelError>;
}

/// Produces the process-wide classifier on first use.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn Classifier>, ModelError>;
}

/// Image identifier reported back with a prediction: the file name.
pub fn image_id(image_path: &Path) -> String {
    image_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

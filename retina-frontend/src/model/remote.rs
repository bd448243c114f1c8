//! Classifier backed by an HTTP prediction endpoint hosting the network.

use super::{image_id, Classifier, ModelError, Prediction};
use crate::config::ModelSettings;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use service_core::observability::TracedClientExt;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct RemotePredictRequest<'a> {
    image: String,
    image_id: &'a str,
    need_features: bool,
}

#[derive(Debug, Deserialize)]
struct RemotePredictResponse {
    logits: Vec<f32>,
    regression: f32,
    ordinal: f32,
    #[serde(default)]
    features: Option<Vec<f32>>,
}

pub struct RemoteClassifier {
    name: String,
    endpoint: String,
    need_features: bool,
    timeout: Duration,
    client: reqwest::Client,
}

impl RemoteClassifier {
    pub fn new(settings: &ModelSettings) -> Result<Self, ModelError> {
        let base_url = settings.remote_url.as_deref().ok_or_else(|| {
            ModelError::Config("model.remote_url is required for the remote backend".to_string())
        })?;

        Ok(Self {
            name: settings.name.clone(),
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
            need_features: settings.need_features,
            timeout: Duration::from_secs(settings.remote_timeout_secs),
            client: reqwest::Client::new(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for RemoteClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, image_path: &Path) -> Result<Prediction, ModelError> {
        let bytes = tokio::fs::read(image_path)
            .await
            .map_err(|e| ModelError::Input(format!("{}: {}", image_path.display(), e)))?;
        let image_id = image_id(image_path);

        let request = RemotePredictRequest {
            image: STANDARD.encode(&bytes),
            image_id: &image_id,
            need_features: self.need_features,
        };

        let response = self
            .client
            .traced_post(&self.endpoint)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ModelError::Remote(format!("request to {} failed: {}", self.endpoint, e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ModelError::Remote(format!("status {}: {}", status, text)));
        }

        let body: RemotePredictResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Remote(format!("invalid prediction payload: {}", e)))?;

        Ok(Prediction {
            image_id,
            logits: body.logits,
            regression: body.regression,
            ordinal: body.ordinal,
            features: body.features.filter(|_| self.need_features),
        })
    }
}

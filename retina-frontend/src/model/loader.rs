use super::onnx::OnnxClassifier;
use super::remote::RemoteClassifier;
use super::{Classifier, ModelError, ModelLoader};
use crate::config::{ModelBackend, ModelSettings};
use async_trait::async_trait;
use std::sync::Arc;

/// Builds the classifier selected by `model.backend`.
pub struct BackendLoader {
    settings: ModelSettings,
}

impl BackendLoader {
    pub fn new(settings: ModelSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl ModelLoader for BackendLoader {
    async fn load(&self) -> Result<Arc<dyn Classifier>, ModelError> {
        match self.settings.backend {
            ModelBackend::Onnx => {
                let settings = self.settings.clone();
                tracing::info!(
                    checkpoint = %settings.checkpoint_path().display(),
                    "Loading ONNX checkpoint"
                );
                let classifier =
                    tokio::task::spawn_blocking(move || OnnxClassifier::load(&settings))
                        .await
                        .map_err(|e| ModelError::Load(format!("load task failed: {}", e)))??;
                Ok(Arc::new(classifier))
            }
            ModelBackend::Remote => Ok(Arc::new(RemoteClassifier::new(&self.settings)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn onnx_backend_reports_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let loader = BackendLoader::new(ModelSettings {
            dir: dir.path().to_path_buf(),
            ..ModelSettings::default()
        });

        assert!(matches!(loader.load().await, Err(ModelError::NotFound(_))));
    }

    #[tokio::test]
    async fn remote_backend_builds_without_contacting_endpoint() {
        let loader = BackendLoader::new(ModelSettings {
            backend: ModelBackend::Remote,
            remote_url: Some("http://127.0.0.1:9".to_string()),
            ..ModelSettings::default()
        });

        let model = loader.load().await.unwrap();
        assert_eq!(model.name(), "seresnext50d_gwap");
    }
}

use super::{Classifier, ModelError, ModelLoader};
use metrics::counter;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Holds the single classifier instance for the process.
///
/// The model is loaded on the first `get_model` call. Concurrent first calls
/// wait on the same load; a failed load leaves the cell empty so the next
/// call tries again.
pub struct ModelCache {
    loader: Arc<dyn ModelLoader>,
    model: OnceCell<Arc<dyn Classifier>>,
}

impl ModelCache {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            model: OnceCell::new(),
        }
    }

    pub async fn get_model(&self) -> Result<Arc<dyn Classifier>, ModelError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                tracing::info!("Loading model");
                match self.loader.load().await {
                    Ok(model) => {
                        counter!("model_loads_total", "status" => "success").increment(1);
                        tracing::info!(model = %model.name(), "Model loaded");
                        Ok(model)
                    }
                    Err(e) => {
                        counter!("model_loads_total", "status" => "error").increment(1);
                        tracing::error!(error = %e, "Failed to load model");
                        Err(e)
                    }
                }
            })
            .await?;

        Ok(model.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.model.initialized()
    }
}

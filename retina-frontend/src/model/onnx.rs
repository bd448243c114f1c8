//! In-process inference on an ONNX export of the network, via tract.

use super::postprocess::{self, OutputOptions, RawOutputs};
use super::preprocess::{self, ImageTensor};
use super::{image_id, Classifier, ModelError, Prediction};
use crate::config::{ModelSettings, TtaMode};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tract_onnx::prelude::*;

type Plan = TypedRunnableModel<TypedModel>;

/// Output heads, in graph output order.
const LOGITS: usize = 0;
const REGRESSION: usize = 1;
const ORDINAL: usize = 2;
const FEATURES: usize = 3;

pub struct OnnxClassifier {
    name: String,
    plan: Arc<Plan>,
    image_size: u32,
    tta: TtaMode,
    options: OutputOptions,
}

impl OnnxClassifier {
    /// Load, optimize and plan the checkpoint. Blocking.
    pub fn load(settings: &ModelSettings) -> Result<Self, ModelError> {
        let path = settings.checkpoint_path();
        if !path.is_file() {
            return Err(ModelError::NotFound(path));
        }

        let model = tract_onnx::onnx()
            .model_for_path(&path)
            .map_err(|e| ModelError::Load(format!("{}: {}", path.display(), e)))?;
        Self::from_model(model, settings, &path.display().to_string())
    }

    /// Fix the input shape, optimize and plan an already parsed graph.
    fn from_model(
        model: InferenceModel,
        settings: &ModelSettings,
        source: &str,
    ) -> Result<Self, ModelError> {
        let size = settings.image_size as usize;
        let model = model
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .and_then(|model| model.into_optimized())
            .map_err(|e| ModelError::Load(format!("{}: {}", source, e)))?;

        if model.outputs.len() < 3 {
            return Err(ModelError::Load(format!(
                "{}: expected logits, regression and ordinal outputs, found {}",
                source,
                model.outputs.len()
            )));
        }

        let plan = model
            .into_runnable()
            .map_err(|e| ModelError::Load(format!("{}: {}", source, e)))?;

        Ok(Self {
            name: settings.name.clone(),
            plan: Arc::new(plan),
            image_size: settings.image_size,
            tta: settings.tta,
            options: OutputOptions {
                apply_softmax: settings.apply_softmax,
                need_features: settings.need_features,
            },
        })
    }

    fn run_view(plan: &Plan, view: ImageTensor) -> Result<RawOutputs, ModelError> {
        let shape = view.shape();
        let input: Tensor = tract_ndarray::Array4::from_shape_vec(shape, view.data)
            .map_err(|e| ModelError::Inference(e.to_string()))?
            .into();

        let outputs = plan
            .run(tvec!(input.into()))
            .map_err(|e| ModelError::Inference(e.to_string()))?;

        let head = |index: usize| -> Result<Vec<f32>, ModelError> {
            let view = outputs[index]
                .to_array_view::<f32>()
                .map_err(|e| ModelError::Inference(format!("output {}: {}", index, e)))?;
            Ok(view.iter().copied().collect())
        };

        Ok(RawOutputs {
            logits: head(LOGITS)?,
            regression: head(REGRESSION)?,
            ordinal: head(ORDINAL)?,
            features: if outputs.len() > FEATURES {
                Some(head(FEATURES)?)
            } else {
                None
            },
        })
    }

    fn predict_blocking(
        plan: &Plan,
        image_path: &Path,
        image_size: u32,
        tta: TtaMode,
        options: OutputOptions,
    ) -> Result<Prediction, ModelError> {
        let views = preprocess::input_fn(image_path, image_size, tta)?;
        let outputs = views
            .into_iter()
            .map(|view| Self::run_view(plan, view))
            .collect::<Result<Vec<_>, _>>()?;
        let outputs = postprocess::average(&outputs)?;
        postprocess::to_prediction(image_id(image_path), outputs, options)
    }
}

#[async_trait]
impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, image_path: &Path) -> Result<Prediction, ModelError> {
        let plan = self.plan.clone();
        let image_path: PathBuf = image_path.to_path_buf();
        let (image_size, tta, options) = (self.image_size, self.tta, self.options);

        tokio::task::spawn_blocking(move || {
            Self::predict_blocking(&plan, &image_path, image_size, tta, options)
        })
        .await
        .map_err(|e| ModelError::Inference(format!("inference task failed: {}", e)))?
    }
}

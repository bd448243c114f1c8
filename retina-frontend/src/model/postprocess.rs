use super::{ModelError, Prediction};

/// Raw network heads for one view of an image.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOutputs {
    pub logits: Vec<f32>,
    pub regression: Vec<f32>,
    pub ordinal: Vec<f32>,
    pub features: Option<Vec<f32>>,
}

/// How raw heads are turned into reported scores.
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub apply_softmax: bool,
    pub need_features: bool,
}

pub fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Expected grade from ordinal threshold logits.
///
/// A single output is already a score and is passed through.
pub fn ordinal_score(ordinal: &[f32]) -> f32 {
    match ordinal {
        [score] => *score,
        thresholds => thresholds.iter().map(|&x| sigmoid(x)).sum(),
    }
}

/// Element-wise mean of every head across test-time views.
pub fn average(views: &[RawOutputs]) -> Result<RawOutputs, ModelError> {
    let (first, rest) = views
        .split_first()
        .ok_or_else(|| ModelError::Inference("no outputs to average".to_string()))?;
    if rest.is_empty() {
        return Ok(first.clone());
    }

    let count = views.len() as f32;
    let mean = |pick: fn(&RawOutputs) -> &[f32]| -> Result<Vec<f32>, ModelError> {
        let mut acc = pick(first).to_vec();
        for view in rest {
            let values = pick(view);
            if values.len() != acc.len() {
                return Err(ModelError::Inference(format!(
                    "output length changed across views: {} vs {}",
                    acc.len(),
                    values.len()
                )));
            }
            acc.iter_mut().zip(values).for_each(|(a, v)| *a += v);
        }
        Ok(acc.into_iter().map(|a| a / count).collect())
    };

    let features = match &first.features {
        Some(_) => Some(mean(|o| o.features.as_deref().unwrap_or(&[]))?),
        None => None,
    };

    Ok(RawOutputs {
        logits: mean(|o| o.logits.as_slice())?,
        regression: mean(|o| o.regression.as_slice())?,
        ordinal: mean(|o| o.ordinal.as_slice())?,
        features,
    })
}

/// Shape averaged heads into the reported prediction.
pub fn to_prediction(
    image_id: String,
    outputs: RawOutputs,
    options: OutputOptions,
) -> Result<Prediction, ModelError> {
    let regression = *outputs
        .regression
        .first()
        .ok_or_else(|| ModelError::Inference("empty regression head".to_string()))?;
    if outputs.ordinal.is_empty() {
        return Err(ModelError::Inference("empty ordinal head".to_string()));
    }

    let logits = if options.apply_softmax {
        softmax(&outputs.logits)
    } else {
        outputs.logits
    };

    Ok(Prediction {
        image_id,
        logits,
        regression,
        ordinal: ordinal_score(&outputs.ordinal),
        features: outputs.features.filter(|_| options.need_features),
    })
}

/// Class scores as shown on the results page.
pub fn format_logits(logits: &[f32]) -> String {
    logits
        .iter()
        .map(|l| format!("{:.4}", l))
        .collect::<Vec<_>>()
        .join(", ")
}

use crate::model::postprocess::format_logits;
use crate::model::{Prediction, Severity};
use crate::AppState;
use askama::Template;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

/// Sample fundus image shown before anything is uploaded.
pub const SAMPLE_IMAGE: &str = "static/img/10011_right_820x615.png";

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    /// Path of the saved upload relative to `/uploads`.
    pub image_loc: Option<String>,
    pub image_id: String,
    pub scale: u8,
    pub severity: String,
    pub logits: String,
    pub regression: String,
    pub ordinal: String,
    pub features: String,
}

impl IndexTemplate {
    pub fn placeholder() -> Self {
        Self {
            image_loc: None,
            image_id: SAMPLE_IMAGE
                .rsplit('/')
                .next()
                .unwrap_or(SAMPLE_IMAGE)
                .to_string(),
            scale: 0,
            severity: Severity::NoDr.to_string(),
            logits: "0".to_string(),
            regression: "0".to_string(),
            ordinal: "0".to_string(),
            features: "None".to_string(),
        }
    }

    pub fn from_prediction(file_name: &str, prediction: &Prediction) -> Self {
        Self {
            image_loc: Some(file_name.to_string()),
            image_id: prediction.image_id.clone(),
            scale: prediction.grade(),
            severity: prediction.severity().to_string(),
            logits: format_logits(&prediction.logits),
            regression: format!("{:.4}", prediction.regression),
            ordinal: format!("{:.4}", prediction.ordinal),
            features: prediction
                .features
                .as_deref()
                .map(format_logits)
                .unwrap_or_else(|| "None".to_string()),
        }
    }
}

pub async fn index() -> impl IntoResponse {
    IndexTemplate::placeholder()
}

/// Container health check: healthy when the model can be loaded.
pub async fn ping(State(state): State<AppState>) -> impl IntoResponse {
    tracing::debug!("Ping received");
    match state.model.get_model().await {
        Ok(_) => (StatusCode::OK, IndexTemplate::placeholder()).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Ping failed: model unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, IndexTemplate::placeholder()).into_response()
        }
    }
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "retina-frontend",
        "version": env!("CARGO_PKG_VERSION"),
        "model_loaded": state.model.is_loaded(),
    }))
}

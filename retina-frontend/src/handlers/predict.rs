use super::app::IndexTemplate;
use crate::services::archive_upload;
use crate::AppState;
use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{counter, histogram};
use service_core::error::AppError;
use std::path::Path;
use std::time::Instant;
use uuid::Uuid;

/// Form field carrying the fundus image.
pub const IMAGE_FIELD: &str = "image";

pub enum PredictError {
    /// Malformed upload. Answered with the plain `bad request!` body.
    BadRequest(String),
    App(AppError),
}

impl From<AppError> for PredictError {
    fn from(err: AppError) -> Self {
        PredictError::App(err)
    }
}

impl From<crate::model::ModelError> for PredictError {
    fn from(err: crate::model::ModelError) -> Self {
        PredictError::App(err.into())
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        match self {
            PredictError::BadRequest(reason) => {
                tracing::warn!(reason = %reason, "Rejected upload");
                (StatusCode::BAD_REQUEST, "bad request!").into_response()
            }
            PredictError::App(err) => err.into_response(),
        }
    }
}

#[derive(Debug)]
pub struct ImageUpload {
    pub file_name: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Reduce a client-supplied file name to a bare, non-hidden base name.
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    // Browsers on Windows may send the full client path.
    let last = raw.rsplit(['/', '\\']).next()?;
    let name = Path::new(last).file_name()?.to_str()?.trim();
    if name.is_empty() || name.starts_with('.') {
        return None;
    }
    Some(name.to_string())
}

async fn read_image_field(multipart: &mut Multipart) -> Result<ImageUpload, PredictError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| PredictError::BadRequest(format!("malformed multipart body: {}", e)))?
            .ok_or_else(|| PredictError::BadRequest(format!("missing `{}` field", IMAGE_FIELD)))?;

        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let file_name = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or_else(|| PredictError::BadRequest("missing or invalid file name".to_string()))?;

        let content_type = field.content_type().unwrap_or_default().to_string();
        if !content_type.starts_with("image/") {
            return Err(PredictError::BadRequest(format!(
                "unsupported content type `{}`",
                content_type
            )));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| PredictError::BadRequest(format!("failed to read upload: {}", e)))?
            .to_vec();
        if data.is_empty() {
            return Err(PredictError::BadRequest("empty upload".to_string()));
        }

        return Ok(ImageUpload {
            file_name,
            content_type,
            data,
        });
    }
}

/// Save the uploaded image, grade it, render the results, archive the image.
pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<IndexTemplate, PredictError> {
    let mut multipart =
        multipart.map_err(|e| PredictError::BadRequest(format!("not a multipart form: {}", e)))?;
    let upload = read_image_field(&mut multipart).await?;

    // Each upload gets its own directory so equal client names never collide.
    let upload_dir = Uuid::new_v4().to_string();
    let stored_name = format!("{}/{}", upload_dir, upload.file_name);
    let image_location = state.settings.data.dir.join(&upload_dir).join(&upload.file_name);
    tracing::info!(
        file_name = %upload.file_name,
        content_type = %upload.content_type,
        size = upload.data.len(),
        path = %image_location.display(),
        "Saving image file"
    );
    tokio::fs::create_dir_all(state.settings.data.dir.join(&upload_dir))
        .await
        .map_err(AppError::from)?;
    tokio::fs::write(&image_location, &upload.data)
        .await
        .map_err(AppError::from)?;

    let model = state.model.get_model().await?;

    let start = Instant::now();
    let result = model.predict(&image_location).await;
    histogram!("prediction_duration_seconds").record(start.elapsed().as_secs_f64());

    let prediction = match result {
        Ok(prediction) => {
            counter!("predictions_total", "status" => "success").increment(1);
            prediction
        }
        Err(e) => {
            counter!("predictions_total", "status" => "error").increment(1);
            tracing::error!(file_name = %upload.file_name, error = %e, "Prediction failed");
            return Err(e.into());
        }
    };

    tracing::info!(
        image_id = %prediction.image_id,
        severity = %prediction.severity(),
        regression = prediction.regression,
        ordinal = prediction.ordinal,
        "Prediction complete"
    );
    let page = IndexTemplate::from_prediction(&stored_name, &prediction);

    // Archive failures never cost the caller their result.
    if let Err(e) = archive_upload(
        state.archive.as_ref(),
        &state.settings.storage.upload_channel,
        &upload.file_name,
        upload.data,
    )
    .await
    {
        tracing::error!(file_name = %upload.file_name, error = %e, "Failed to archive upload");
    }

    Ok(page)
}

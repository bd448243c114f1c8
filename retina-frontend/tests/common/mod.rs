#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request};
use retina_frontend::config::Settings;
use retina_frontend::model::{
    image_id, Classifier, ModelCache, ModelError, ModelLoader, Prediction,
};
use retina_frontend::services::{LocalStorage, Storage};
use retina_frontend::AppState;
use service_core::error::AppError;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

pub const BOUNDARY: &str = "retina-test-boundary";

/// Grades every image as moderate DR.
pub struct StubClassifier;

#[async_trait]
impl Classifier for StubClassifier {
    fn name(&self) -> &str {
        "stub"
    }

    async fn predict(&self, image_path: &Path) -> Result<Prediction, ModelError> {
        if !image_path.is_file() {
            return Err(ModelError::Input(format!("{} missing", image_path.display())));
        }
        Ok(Prediction {
            image_id: image_id(image_path),
            logits: vec![0.05, 0.15, 0.6, 0.15, 0.05],
            regression: 2.1,
            ordinal: 1.9,
            features: None,
        })
    }
}

/// Loads fine but fails every prediction.
pub enum FailingClassifier {
    /// The image cannot be decoded.
    UnreadableImage,
    /// The prediction service is down.
    RemoteDown,
}

#[async_trait]
impl Classifier for FailingClassifier {
    fn name(&self) -> &str {
        "failing"
    }

    async fn predict(&self, image_path: &Path) -> Result<Prediction, ModelError> {
        Err(match self {
            FailingClassifier::UnreadableImage => {
                ModelError::Input(format!("{}: not an image", image_path.display()))
            }
            FailingClassifier::RemoteDown => {
                ModelError::Remote("status 500 Internal Server Error".to_string())
            }
        })
    }
}

#[derive(Clone, Copy)]
enum LoaderMode {
    Working,
    Broken,
    UnreadableImage,
    RemoteDown,
}

pub struct StubLoader {
    pub loads: AtomicUsize,
    mode: LoaderMode,
}

impl StubLoader {
    fn with_mode(mode: LoaderMode) -> Self {
        Self {
            loads: AtomicUsize::new(0),
            mode,
        }
    }

    pub fn working() -> Self {
        Self::with_mode(LoaderMode::Working)
    }

    /// The checkpoint is missing.
    pub fn broken() -> Self {
        Self::with_mode(LoaderMode::Broken)
    }

    pub fn unreadable_images() -> Self {
        Self::with_mode(LoaderMode::UnreadableImage)
    }

    pub fn remote_down() -> Self {
        Self::with_mode(LoaderMode::RemoteDown)
    }
}

#[async_trait]
impl ModelLoader for StubLoader {
    async fn load(&self) -> Result<Arc<dyn Classifier>, ModelError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            LoaderMode::Working => Ok(Arc::new(StubClassifier)),
            LoaderMode::Broken => Err(ModelError::NotFound("/home/model/model.onnx".into())),
            LoaderMode::UnreadableImage => Ok(Arc::new(FailingClassifier::UnreadableImage)),
            LoaderMode::RemoteDown => Ok(Arc::new(FailingClassifier::RemoteDown)),
        }
    }
}

/// Archive bucket that rejects every write.
#[derive(Default)]
pub struct FailingStorage {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Storage for FailingStorage {
    async fn upload(&self, key: &str, _data: Vec<u8>) -> Result<(), AppError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(AppError::StorageError(anyhow::anyhow!(
            "S3 upload to s3://archive/{} failed: access denied",
            key
        )))
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        Err(AppError::NotFound(anyhow::anyhow!("{} not found", key)))
    }
}

pub struct TestApp {
    pub state: AppState,
    pub loader: Arc<StubLoader>,
    pub archive: Arc<LocalStorage>,
    pub data_dir: TempDir,
    pub archive_dir: TempDir,
}

impl TestApp {
    pub async fn new(loader: StubLoader) -> Self {
        Self::build(loader, None).await
    }

    /// Same app, archiving into `archive` instead of the local archive dir.
    pub async fn with_archive(loader: StubLoader, archive: Arc<dyn Storage>) -> Self {
        Self::build(loader, Some(archive)).await
    }

    async fn build(loader: StubLoader, archive_override: Option<Arc<dyn Storage>>) -> Self {
        let data_dir = tempfile::tempdir().expect("Failed to create data dir");
        let archive_dir = tempfile::tempdir().expect("Failed to create archive dir");

        let mut settings: Settings = serde_json::from_str("{}").expect("default settings");
        settings.server.host = "127.0.0.1".to_string();
        settings.server.port = 0;
        settings.data.dir = data_dir.path().to_path_buf();

        let loader = Arc::new(loader);
        let archive = Arc::new(
            LocalStorage::new(archive_dir.path())
                .await
                .expect("Failed to create archive storage"),
        );
        let model = Arc::new(ModelCache::new(loader.clone()));
        let archive_target =
            archive_override.unwrap_or_else(|| archive.clone() as Arc<dyn Storage>);
        let state = AppState::new(settings, model, archive_target);

        TestApp {
            state,
            loader,
            archive,
            data_dir,
            archive_dir,
        }
    }

    pub fn loads(&self) -> usize {
        self.loader.loads.load(Ordering::SeqCst)
    }

    /// Every file saved under the data dir, one level of upload directories deep.
    pub fn saved_uploads(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(self.data_dir.path()).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                for inner in std::fs::read_dir(&path).unwrap() {
                    files.push(inner.unwrap().path());
                }
            } else {
                files.push(path);
            }
        }
        files.sort();
        files
    }
}

/// One-part multipart form body.
pub fn multipart_body(field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

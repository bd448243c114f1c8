use serde::Deserialize;
use service_core::error::AppError;
use service_core::observability::TelemetrySettings;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub telemetry: TelemetrySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted multipart body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8888
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// ONNX export of the network, run in-process with tract.
    Onnx,
    /// Model hosted behind an HTTP prediction endpoint.
    Remote,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TtaMode {
    #[default]
    None,
    /// Average the prediction with the one on the horizontally mirrored image.
    Flip,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelSettings {
    #[serde(default = "default_backend")]
    pub backend: ModelBackend,
    #[serde(default = "default_model_name")]
    pub name: String,
    #[serde(default = "default_model_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_checkpoint")]
    pub checkpoint: String,
    #[serde(default = "default_true")]
    pub apply_softmax: bool,
    #[serde(default)]
    pub tta: TtaMode,
    #[serde(default)]
    pub need_features: bool,
    /// Side length the fundus image is resized to before inference.
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    /// Base URL of the prediction service, for the remote backend.
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
}

fn default_backend() -> ModelBackend {
    ModelBackend::Onnx
}

fn default_model_name() -> String {
    "seresnext50d_gwap".to_string()
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("/home/model")
}

fn default_checkpoint() -> String {
    "model.onnx".to_string()
}

fn default_true() -> bool {
    true
}

fn default_image_size() -> u32 {
    512
}

fn default_remote_timeout_secs() -> u64 {
    60
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            name: default_model_name(),
            dir: default_model_dir(),
            checkpoint: default_checkpoint(),
            apply_softmax: true,
            tta: TtaMode::None,
            need_features: false,
            image_size: default_image_size(),
            remote_url: None,
            remote_timeout_secs: default_remote_timeout_secs(),
        }
    }
}

impl ModelSettings {
    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(&self.checkpoint)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSettings {
    /// Where uploaded images are saved before inference.
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/home/endpoint/data")
}

impl Default for DataSettings {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Local,
    S3,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    #[serde(default = "default_storage_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_region")]
    pub region: String,
    /// Bucket receiving archived uploads.
    #[serde(default = "default_data_bucket")]
    pub data_bucket: String,
    /// Bucket holding the deployed checkpoint.
    #[serde(default = "default_model_bucket")]
    pub model_bucket: String,
    #[serde(default = "default_model_prefix")]
    pub model_prefix: String,
    /// Key prefix for archived uploads.
    #[serde(default = "default_upload_channel")]
    pub upload_channel: String,
    /// Root directory of the local backend.
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::S3
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_data_bucket() -> String {
    "diabetic-retinopathy-data-from-radiology".to_string()
}

fn default_model_bucket() -> String {
    "dataset-retinopathy".to_string()
}

fn default_model_prefix() -> String {
    "deployment".to_string()
}

fn default_upload_channel() -> String {
    "image".to_string()
}

fn default_local_path() -> PathBuf {
    PathBuf::from("storage")
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            region: default_region(),
            data_bucket: default_data_bucket(),
            model_bucket: default_model_bucket(),
            model_prefix: default_model_prefix(),
            upload_channel: default_upload_channel(),
            local_path: default_local_path(),
        }
    }
}

pub fn get_configuration() -> Result<Settings, AppError> {
    service_core::config::load_settings("retina-frontend")
}

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use metrics::counter;
use service_core::error::AppError;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::{StorageBackend, StorageSettings};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError>;
    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError>;
}

pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub async fn new(base_path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let base_path = base_path.into();
        if !base_path.exists() {
            fs::create_dir_all(&base_path).await?;
        }
        Ok(Self { base_path })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        let path = self.base_path.join(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, data).await?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let path = self.base_path.join(key);
        if !path.is_file() {
            return Err(AppError::NotFound(anyhow::anyhow!("{} not found", key)));
        }
        let data = fs::read(path).await?;
        Ok(data)
    }
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn upload(&self, key: &str, data: Vec<u8>) -> Result<(), AppError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                AppError::StorageError(anyhow::anyhow!(
                    "S3 upload to s3://{}/{} failed: {}",
                    self.bucket,
                    key,
                    e
                ))
            })?;
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Vec<u8>, AppError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                AppError::StorageError(anyhow::anyhow!(
                    "S3 download of s3://{}/{} failed: {}",
                    self.bucket,
                    key,
                    e
                ))
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| {
                AppError::StorageError(anyhow::anyhow!("S3 body collection failed: {}", e))
            })?
            .into_bytes()
            .to_vec();

        Ok(data)
    }
}

/// The two buckets the front end talks to.
pub struct StorageHandles {
    /// Archive for uploaded images.
    pub data: std::sync::Arc<dyn Storage>,
    /// Source of the deployed checkpoint.
    pub models: std::sync::Arc<dyn Storage>,
}

pub async fn build_storage(settings: &StorageSettings) -> Result<StorageHandles, AppError> {
    match settings.backend {
        StorageBackend::S3 => {
            let sdk_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(aws_config::Region::new(settings.region.clone()))
                .load()
                .await;
            let client = S3Client::new(&sdk_config);
            Ok(StorageHandles {
                data: std::sync::Arc::new(S3Storage::new(
                    client.clone(),
                    settings.data_bucket.clone(),
                )),
                models: std::sync::Arc::new(S3Storage::new(
                    client,
                    settings.model_bucket.clone(),
                )),
            })
        }
        StorageBackend::Local => {
            let root = &settings.local_path;
            Ok(StorageHandles {
                data: std::sync::Arc::new(
                    LocalStorage::new(root.join(&settings.data_bucket)).await?,
                ),
                models: std::sync::Arc::new(
                    LocalStorage::new(root.join(&settings.model_bucket)).await?,
                ),
            })
        }
    }
}

pub fn archive_key(channel: &str, file_name: &str) -> String {
    format!("{}/{}", channel.trim_end_matches('/'), file_name)
}

/// Archive an uploaded image under `{channel}/{file_name}`.
pub async fn archive_upload(
    storage: &dyn Storage,
    channel: &str,
    file_name: &str,
    data: Vec<u8>,
) -> Result<String, AppError> {
    let key = archive_key(channel, file_name);
    match storage.upload(&key, data).await {
        Ok(()) => {
            counter!("archive_uploads_total", "status" => "success").increment(1);
            tracing::info!(key = %key, "Archived upload");
            Ok(key)
        }
        Err(e) => {
            counter!("archive_uploads_total", "status" => "error").increment(1);
            Err(e)
        }
    }
}

/// Download `{prefix}/{checkpoint}` to `dest` unless it is already present.
///
/// The bytes land in a `.part` sibling first and are renamed into place, so an
/// interrupted download never leaves a truncated checkpoint at `dest`.
/// Returns whether a download happened.
pub async fn fetch_checkpoint(
    storage: &dyn Storage,
    prefix: &str,
    checkpoint: &str,
    dest: &Path,
) -> Result<bool, AppError> {
    if dest.is_file() {
        tracing::info!(path = %dest.display(), "Checkpoint already present");
        return Ok(false);
    }

    let key = archive_key(prefix, checkpoint);
    tracing::info!(key = %key, path = %dest.display(), "Downloading checkpoint");
    let data = storage.download(&key).await?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }
    let partial = partial_path(dest);
    fs::write(&partial, data).await?;
    if let Err(e) = fs::rename(&partial, dest).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }
    Ok(true)
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

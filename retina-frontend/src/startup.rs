use axum::{extract::DefaultBodyLimit, middleware::from_fn, routing::get, Router};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::{ModelBackend, Settings};
use crate::handlers::{health_check, index, metrics::metrics, ping, predict};
use crate::model::{BackendLoader, ModelCache};
use crate::services::{build_storage, fetch_checkpoint, StorageHandles};
use crate::AppState;

/// Directory holding the stylesheet and sample image.
fn static_dir() -> PathBuf {
    let base = std::env::current_dir().unwrap_or_default();
    if base.ends_with("retina-frontend") {
        base.join("static")
    } else {
        base.join("retina-frontend").join("static")
    }
}

pub fn build_router(state: AppState) -> Router {
    let max_upload_bytes = state.settings.server.max_upload_bytes;
    let uploads = ServeDir::new(&state.settings.data.dir);

    Router::new()
        .route("/", get(index).post(predict))
        .route("/ping", get(ping))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .nest_service("/static", ServeDir::new(static_dir()))
        .nest_service("/uploads", uploads)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(from_fn(security_headers_middleware))
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        // Outermost, so the trace span sees the request id
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

async fn ensure_dir(path: &Path) -> Result<(), AppError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "Creating directory");
        tokio::fs::create_dir_all(path).await?;
    }
    Ok(())
}

/// Prepare directories and the checkpoint, then warm the model.
///
/// A model that fails to load is logged, not fatal: `/ping` keeps
/// reporting it and the next request retries the load.
pub async fn prepare(settings: &Settings, storage: &StorageHandles, model: &ModelCache) {
    if settings.model.backend == ModelBackend::Onnx {
        let checkpoint = settings.model.checkpoint_path();
        if let Err(e) = fetch_checkpoint(
            storage.models.as_ref(),
            &settings.storage.model_prefix,
            &settings.model.checkpoint,
            &checkpoint,
        )
        .await
        {
            tracing::error!(
                path = %checkpoint.display(),
                error = %e,
                "Failed to fetch model checkpoint"
            );
        }
    }

    let status = match model.get_model().await {
        Ok(_) => 200,
        Err(_) => 404,
    };
    tracing::info!(status, model = %settings.model.name, "Model warm-up finished");
}

pub struct Application {
    port: u16,
    server: Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + Unpin>,
}

impl Application {
    pub async fn build(settings: Settings) -> Result<Self, AppError> {
        ensure_dir(&settings.data.dir).await?;
        ensure_dir(&settings.model.dir).await?;

        let storage = build_storage(&settings.storage).await.map_err(|e| {
            tracing::error!("Failed to initialize storage: {}", e);
            e
        })?;

        let model = Arc::new(ModelCache::new(Arc::new(BackendLoader::new(
            settings.model.clone(),
        ))));
        prepare(&settings, &storage, &model).await;

        let state = AppState::new(settings, model, storage.data.clone());
        Self::serve(state).await
    }

    /// Bind and serve an already assembled state.
    pub async fn serve(state: AppState) -> Result<Self, AppError> {
        let address = format!(
            "{}:{}",
            state.settings.server.host, state.settings.server.port
        );
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", listener.local_addr()?);

        let server = axum::serve(listener, build_router(state))
            .with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.server.await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

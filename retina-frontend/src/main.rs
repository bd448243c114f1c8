use dotenvy::dotenv;
use retina_frontend::config::get_configuration;
use retina_frontend::startup::Application;
use service_core::observability::{init_metrics, init_tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let configuration = get_configuration().map_err(|e| {
        eprintln!("Failed to read configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    init_tracing("retina-frontend", &configuration.telemetry)
        .map_err(|e| anyhow::anyhow!("Tracing initialization error: {}", e))?;
    init_metrics().map_err(|e| anyhow::anyhow!("Metrics initialization error: {}", e))?;

    tracing::info!(
        model = %configuration.model.name,
        backend = ?configuration.model.backend,
        "Initialising app, checking directories and model files"
    );

    let application = Application::build(configuration).await.map_err(|e| {
        tracing::error!("Failed to start retina-frontend: {}", e);
        anyhow::anyhow!("Startup error: {}", e)
    })?;

    application.run_until_stopped().await.map_err(|e| {
        tracing::error!("Server error: {}", e);
        anyhow::anyhow!("Server error: {}", e)
    })?;

    Ok(())
}

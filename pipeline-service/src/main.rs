use pipeline_service::config::PipelineConfig;
use pipeline_service::services::init_metrics;
use pipeline_service::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Must precede any metric being recorded
    init_metrics();

    let config = PipelineConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "pipeline-service",
        &config.common.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        port = config.common.port,
        workers = config.worker.worker_count,
        queue_size = config.worker.queue_size,
        converter = ?config.converter.backend,
        "Starting pipeline service"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    app.run_until_stopped().await
}

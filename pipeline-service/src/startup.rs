use crate::config::{ConverterBackend, PipelineConfig};
use crate::handlers;
use crate::services::{JobDispatcher, RequestValidator, StatusTracker};
use crate::workers::{Converter, HttpConverter, PassthroughConverter, WorkerPool};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{metrics_middleware, request_id_middleware};
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: PipelineConfig,
    pub tracker: StatusTracker,
    pub dispatcher: JobDispatcher,
    pub validator: RequestValidator,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/convert", post(handlers::convert))
        .route("/status/:job_id", get(handlers::get_job_status))
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/:job_id", delete(handlers::cancel_job))
        .route("/ready", get(handlers::readiness_check))
        .route_layer(middleware::from_fn(metrics_middleware))
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

fn converter_for(config: &PipelineConfig) -> Result<Arc<dyn Converter>, AppError> {
    match config.converter.backend {
        ConverterBackend::Passthrough => Ok(Arc::new(PassthroughConverter::new())),
        ConverterBackend::Http => {
            let endpoint = config.converter.endpoint.clone().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!(
                    "CONVERTER_ENDPOINT is required for the http backend"
                ))
            })?;
            Ok(Arc::new(HttpConverter::new(endpoint)))
        }
    }
}

type Server = Box<dyn Future<Output = std::io::Result<()>> + Send + Unpin>;

pub struct Application {
    port: u16,
    server: Server,
    worker_pool: WorkerPool,
}

impl Application {
    pub async fn build(config: PipelineConfig) -> Result<Self, AppError> {
        let converter = converter_for(&config)?;
        Self::build_with_converter(config, converter).await
    }

    pub async fn build_with_converter(
        config: PipelineConfig,
        converter: Arc<dyn Converter>,
    ) -> Result<Self, AppError> {
        let tracker = StatusTracker::new();

        let (mut worker_pool, job_tx) =
            WorkerPool::new(config.worker.clone(), tracker.clone(), converter);
        let dispatcher = JobDispatcher::new(tracker.clone(), job_tx, worker_pool.in_flight());

        let state = AppState {
            validator: RequestValidator::new(config.formats.clone()),
            config: config.clone(),
            tracker,
            dispatcher,
        };

        let app = build_router(state);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        // Workers only run once the service can actually take requests.
        worker_pool.start();

        tracing::info!("Listening on {}", port);

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

        Ok(Self {
            port,
            server: Box::new(server.into_future()),
            worker_pool,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let result = self.server.await;
        self.worker_pool.shutdown().await;
        result
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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

#![allow(dead_code)]

use async_trait::async_trait;
use pipeline_service::config::{
    ConverterBackend, ConverterConfig, FormatConfig, PipelineConfig, WorkerConfig,
};
use pipeline_service::models::ConversionResult;
use pipeline_service::services::init_metrics;
use pipeline_service::startup::Application;
use pipeline_service::workers::{ConversionRequest, Converter, ConverterError};
use serde_json::Value;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

static INIT_METRICS: Once = Once::new();

pub fn ensure_metrics_initialized() {
    INIT_METRICS.call_once(|| {
        init_metrics();
    });
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
}

pub fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig {
        common: Default::default(),
        worker: WorkerConfig {
            worker_count: 2,
            queue_size: 16,
            conversion_timeout_ms: 2_000,
            initial_backoff_ms: 10,
            max_backoff_ms: 50,
            ..Default::default()
        },
        converter: ConverterConfig {
            backend: ConverterBackend::Passthrough,
            endpoint: None,
        },
        formats: FormatConfig::default(),
        otlp_endpoint: None,
    };
    config.common.port = 0; // Random port for testing
    config
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config(), None).await
    }

    pub async fn spawn_with(config: PipelineConfig, converter: Option<Arc<dyn Converter>>) -> Self {
        let app = match converter {
            Some(converter) => Application::build_with_converter(config, converter).await,
            None => Application::build(config).await,
        }
        .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
        }
    }

    pub async fn submit(&self, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/convert", self.address))
            .json(&body)
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn status(&self, job_id: &str) -> reqwest::Response {
        self.client
            .get(format!("{}/status/{}", self.address, job_id))
            .send()
            .await
            .expect("Failed to execute request")
    }

    pub async fn cancel(&self, job_id: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}/jobs/{}", self.address, job_id))
            .send()
            .await
            .expect("Failed to execute request")
    }

    /// Poll `/status` until the job reaches `state`, returning the final body.
    pub async fn wait_for_state(&self, job_id: &str, state: &str) -> Value {
        let mut last = Value::Null;
        for _ in 0..100 {
            let response = self.status(job_id).await;
            assert_eq!(response.status(), 200);
            last = response.json().await.expect("Failed to parse JSON");
            if last["state"] == state {
                return last;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job {} never reached {}: {}", job_id, state, last);
    }
}

/// Converter that holds every call open until it is cancelled.
#[derive(Default)]
pub struct BlockingConverter;

#[async_trait]
impl Converter for BlockingConverter {
    fn name(&self) -> &str {
        "blocking"
    }

    async fn convert(
        &self,
        _request: &ConversionRequest,
        cancel: CancellationToken,
    ) -> Result<ConversionResult, ConverterError> {
        cancel.cancelled().await;
        Err(ConverterError::Cancelled)
    }
}

use crate::models::OutputFormat;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub worker: WorkerConfig,
    pub converter: ConverterConfig,
    pub formats: FormatConfig,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// When false the queue accepts jobs but nothing drains it.
    pub enabled: bool,
    pub worker_count: usize,
    pub queue_size: usize,
    pub conversion_timeout_ms: u64,
    /// Total invocations per job, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl WorkerConfig {
    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_millis(self.conversion_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_count: 4,
            queue_size: 100,
            conversion_timeout_ms: 60_000,
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConverterBackend {
    Passthrough,
    Http,
}

impl std::str::FromStr for ConverterBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passthrough" => Ok(ConverterBackend::Passthrough),
            "http" => Ok(ConverterBackend::Http),
            _ => Err(format!("Invalid converter backend: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConverterConfig {
    pub backend: ConverterBackend,
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FormatConfig {
    pub supported: Vec<OutputFormat>,
    pub default: OutputFormat,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            supported: vec![
                OutputFormat::Markdown,
                OutputFormat::Text,
                OutputFormat::Html,
                OutputFormat::Json,
            ],
            default: OutputFormat::Markdown,
        }
    }
}

impl PipelineConfig {
    pub fn load() -> Result<Self, AppError> {
        // Load common config (handles .env and APP__ prefix)
        let common_config = core_config::Config::load()?;
        let is_prod = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string()) == "prod";
        let defaults = WorkerConfig::default();

        let worker = WorkerConfig {
            enabled: parse_env("WORKER_ENABLED", defaults.enabled)?,
            worker_count: parse_env("WORKER_COUNT", defaults.worker_count)?,
            queue_size: parse_env("WORKER_QUEUE_SIZE", defaults.queue_size)?,
            conversion_timeout_ms: secs_to_millis(
                "CONVERSION_TIMEOUT_SECS",
                parse_env("CONVERSION_TIMEOUT_SECS", defaults.conversion_timeout_ms / 1000)?,
            )?,
            max_attempts: parse_env("CONVERSION_MAX_ATTEMPTS", defaults.max_attempts)?,
            initial_backoff_ms: parse_env("RETRY_INITIAL_BACKOFF_MS", defaults.initial_backoff_ms)?,
            max_backoff_ms: parse_env("RETRY_MAX_BACKOFF_MS", defaults.max_backoff_ms)?,
        };

        let backend: ConverterBackend = get_env("CONVERTER_BACKEND", Some("passthrough"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let endpoint = match backend {
            ConverterBackend::Http => Some(get_env("CONVERTER_ENDPOINT", None, is_prod)?),
            ConverterBackend::Passthrough => env::var("CONVERTER_ENDPOINT").ok(),
        };

        let supported = get_env("SUPPORTED_FORMATS", Some("markdown,text,html,json"), is_prod)?
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<OutputFormat>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let default = get_env("DEFAULT_FORMAT", Some("markdown"), is_prod)?
            .parse::<OutputFormat>()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let config = PipelineConfig {
            common: common_config,
            worker,
            converter: ConverterConfig { backend, endpoint },
            formats: FormatConfig { supported, default },
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the worker pool or validator cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: &str| Err(AppError::ConfigError(anyhow::anyhow!(msg.to_string())));

        if self.worker.worker_count == 0 {
            return invalid("WORKER_COUNT must be at least 1");
        }
        if self.worker.queue_size == 0 {
            return invalid("WORKER_QUEUE_SIZE must be at least 1");
        }
        if self.worker.max_attempts == 0 {
            return invalid("CONVERSION_MAX_ATTEMPTS must be at least 1");
        }
        if self.worker.conversion_timeout_ms == 0 {
            return invalid("CONVERSION_TIMEOUT_SECS must be at least 1");
        }
        if self.formats.supported.is_empty() {
            return invalid("SUPPORTED_FORMATS must list at least one format");
        }
        if !self.formats.supported.contains(&self.formats.default) {
            return invalid("DEFAULT_FORMAT must be one of SUPPORTED_FORMATS");
        }
        if self.converter.backend == ConverterBackend::Http && self.converter.endpoint.is_none() {
            return invalid("CONVERTER_ENDPOINT is required for the http converter backend");
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn secs_to_millis(key: &str, secs: u64) -> Result<u64, AppError> {
    secs.checked_mul(1000).ok_or_else(|| {
        AppError::ConfigError(anyhow::anyhow!("{} is too large: {} seconds", key, secs))
    })
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, val, e))
        }),
        Err(_) => Ok(default),
    }
}

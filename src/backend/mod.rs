//! LLM backends.
//!
//! Every provider implements [`AnalysisBackend`]: a prompt goes in, text or
//! a classified [`BackendError`] comes out. The pipeline never looks behind
//! this trait.

pub mod cleanup;
pub mod ollama;
pub mod openai;
#[cfg(test)]
pub mod testing;

pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;

use crate::config::{BackendConfig, Provider};
use crate::error::{BackendError, FailureKind};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// A text-generation capability.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Short label for logs and reports, e.g. `ollama/llama3.2`.
    fn label(&self) -> String;

    async fn generate(&self, prompt: &str) -> Result<String, BackendError>;
}

/// Settings shared by the HTTP backends.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub provider: Provider,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
    pub clean_repetition: bool,
}

impl HttpSettings {
    pub fn client(&self) -> Result<reqwest::Client, BackendError> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .build()
            .map_err(|e| BackendError::unknown(format!("Failed to create HTTP client: {}", e)))
    }
}

/// Classify a non-success HTTP status.
pub fn classify_status(status: StatusCode, body: &str) -> BackendError {
    let message = format!("API error {}: {}", status, truncate(body, 300));
    match status.as_u16() {
        401 | 403 => BackendError::auth(message),
        429 => BackendError::rate_limit(message),
        408 | 504 => BackendError::timeout(message),
        _ => BackendError::unknown(message),
    }
}

/// Classify a transport-level failure.
pub fn classify_transport(err: &reqwest::Error, base_url: &str, timeout_seconds: u64) -> BackendError {
    if err.is_timeout() {
        BackendError::timeout(format!("Request timed out after {}s", timeout_seconds))
    } else if err.is_connect() {
        BackendError::unknown(format!("Cannot connect to {}", base_url))
    } else if err.is_decode() {
        BackendError::malformed(format!("Failed to decode response: {}", err))
    } else {
        BackendError::unknown(format!("Failed to send request: {}", err))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Retries rate-limit and timeout failures a bounded number of times.
///
/// Retrying is local to one backend call and invisible to the pipeline.
pub struct RetryingBackend {
    inner: Arc<dyn AnalysisBackend>,
    retries: usize,
    backoff: Duration,
}

impl RetryingBackend {
    pub fn new(inner: Arc<dyn AnalysisBackend>, retries: usize, backoff: Duration) -> Self {
        Self {
            inner,
            retries,
            backoff,
        }
    }
}

#[async_trait]
impl AnalysisBackend for RetryingBackend {
    fn label(&self) -> String {
        self.inner.label()
    }

    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let mut attempt = 0;
        loop {
            match self.inner.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.kind.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    let delay = self.backoff * attempt as u32;
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        self.inner.label(),
                        e.kind,
                        attempt,
                        self.retries,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Build the configured backend, wrapped with retries.
///
/// `env` looks up API keys so tests can avoid the process environment.
pub fn build_backend(
    config: &BackendConfig,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn AnalysisBackend>, BackendError> {
    let provider = config.resolve_provider(&env);

    let api_key = match provider.api_key_var() {
        Some(var) => Some(env(var).ok_or_else(|| {
            BackendError::new(
                FailureKind::Auth,
                format!("{} is not set for provider {:?}", var, provider),
            )
        })?),
        None => None,
    };

    let settings = HttpSettings {
        provider,
        base_url: config
            .base_url
            .clone()
            .unwrap_or_else(|| provider.default_base_url().to_string())
            .trim_end_matches('/')
            .to_string(),
        model: config
            .model
            .clone()
            .unwrap_or_else(|| provider.default_model().to_string()),
        api_key,
        temperature: config.effective_temperature(provider),
        max_tokens: config.max_tokens,
        timeout_seconds: config.timeout_seconds,
        clean_repetition: config
            .clean_repetition
            .unwrap_or(provider == Provider::Huggingface),
    };

    info!(
        "Using {:?} backend: model {} at {}",
        provider, settings.model, settings.base_url
    );

    let inner: Arc<dyn AnalysisBackend> = match provider {
        Provider::Ollama => Arc::new(OllamaBackend::new(settings)?),
        _ => Arc::new(OpenAiBackend::new(settings)?),
    };

    Ok(Arc::new(RetryingBackend::new(
        inner,
        config.retries,
        Duration::from_millis(config.retry_backoff_ms),
    )))
}
